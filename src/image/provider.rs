//! Image provider trait.

use crate::error::Result;
use crate::image::types::{GeneratedImage, GenerationRequest};
use async_trait::async_trait;

/// A backend that turns one request into one image.
///
/// Implementations make exactly one upstream call per `generate` and report
/// transient failures as distinct error variants; retrying is the caller's
/// job (see [`crate::controller::GenerationController`]).
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Makes a single generation attempt.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage>;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str;

    /// Checks if the provider is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}
