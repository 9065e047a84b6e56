//! Image generation providers.

mod huggingface;

pub use huggingface::{
    HuggingFaceModel, HuggingFaceProvider, HuggingFaceProviderBuilder, API_KEY_ENV,
};
