//! Image generation module.

mod provider;
pub mod providers;
mod types;

pub use provider::ImageProvider;
pub use types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, GenerationResult, ImageFormat,
    InferenceParameters, DEFAULT_DEADLINE,
};
