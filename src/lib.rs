#![warn(missing_docs)]
//! PromptPix - text-to-image generation with per-user history.
//!
//! A prompt goes through a [`GenerationController`], which calls a hosted
//! diffusion model with bounded retries. Successful results are recorded per
//! signed-in user through a [`PersistenceGateway`]. Identity comes from a
//! [`SessionAdapter`] over an external identity provider.
//!
//! # Quick Start
//!
//! ```no_run
//! use promptpix::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> promptpix::Result<()> {
//!     let provider = HuggingFaceProvider::builder().build()?;
//!     let controller = GenerationController::builder(Arc::new(provider)).build();
//!
//!     let identity = GoTrueProvider::builder().build()?;
//!     let sessions = SessionAdapter::new(Arc::new(identity));
//!     let session = sessions
//!         .sign_in(&Credentials::new("me@example.com", "hunter22"))
//!         .await?;
//!
//!     let store = SqliteRecordStore::connect("sqlite://./data/promptpix.db").await?;
//!     let gateway = PersistenceGateway::new(Arc::new(store));
//!
//!     let result = controller.generate("a lighthouse at dusk", &session).await?;
//!     result.image.save("lighthouse.png")?;
//!     gateway.save(&session, &result).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `cli` (default): the `promptpix` binary and its interactive shell.

mod error;

pub mod config;
pub mod controller;
pub mod image;
pub mod persistence;
pub mod session;
pub mod shell;

pub use config::Settings;
pub use controller::{GenerationController, RetryPolicy, Sleeper, TokioSleeper};
pub use error::{PromptPixError, Result};
pub use image::providers::HuggingFaceProvider;
pub use image::{GeneratedImage, GenerationRequest, GenerationResult, ImageProvider};
pub use persistence::{ImageRecord, PersistenceGateway, RecordStore, SqliteRecordStore};
pub use session::providers::GoTrueProvider;
pub use session::{Credentials, IdentityProvider, Session, SessionAdapter};

/// Commonly used types.
pub mod prelude {
    pub use crate::controller::{GenerationController, RetryPolicy};
    pub use crate::error::{PromptPixError, Result};
    pub use crate::image::providers::HuggingFaceProvider;
    pub use crate::image::{GenerationRequest, GenerationResult, ImageProvider};
    pub use crate::persistence::{PersistenceGateway, SqliteRecordStore};
    pub use crate::session::providers::GoTrueProvider;
    pub use crate::session::{Credentials, Session, SessionAdapter};
}
