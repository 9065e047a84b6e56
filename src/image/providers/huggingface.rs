//! Hugging Face hosted inference provider (text-to-image diffusion models).

use crate::error::{parse_retry_after, sanitize_error_message, PromptPixError, Result};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, InferenceParameters,
};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Environment variable holding the inference API token.
pub const API_KEY_ENV: &str = "HF_API_TOKEN";

/// Lowercased marker the backend emits when a GPU worker runs out of memory.
const RESOURCE_EXHAUSTED_MARKER: &str = "cuda out of memory";

/// Well-known text-to-image models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HuggingFaceModel {
    /// Stable Diffusion XL base 1.0.
    #[default]
    StableDiffusionXl,
    /// Stable Diffusion 2.1.
    StableDiffusion21,
}

impl HuggingFaceModel {
    /// Returns the hub model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StableDiffusionXl => "stabilityai/stable-diffusion-xl-base-1.0",
            Self::StableDiffusion21 => "stabilityai/stable-diffusion-2-1",
        }
    }
}

/// Builder for HuggingFaceProvider.
#[derive(Debug, Clone)]
pub struct HuggingFaceProviderBuilder {
    api_key: Option<String>,
    base_url: String,
    model_id: String,
}

impl Default for HuggingFaceProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: HuggingFaceModel::default().as_str().to_string(),
        }
    }
}

impl HuggingFaceProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `HF_API_TOKEN` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the inference host (scheme and authority, no trailing path).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Selects one of the well-known models.
    pub fn model(mut self, model: HuggingFaceModel) -> Self {
        self.model_id = model.as_str().to_string();
        self
    }

    /// Selects a model by hub identifier.
    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Builds the provider, resolving the API key.
    ///
    /// A missing or blank key is a [`PromptPixError::Configuration`] error so
    /// that no generation can be attempted without one.
    pub fn build(self) -> Result<HuggingFaceProvider> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PromptPixError::Configuration(format!(
                    "{API_KEY_ENV} not set and no API key provided"
                ))
            })?;

        Ok(HuggingFaceProvider {
            client: reqwest::Client::new(),
            api_key,
            base_url: self.base_url,
            model_id: self.model_id,
        })
    }
}

/// Hugging Face inference image provider.
pub struct HuggingFaceProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
}

impl HuggingFaceProvider {
    /// Creates a new `HuggingFaceProviderBuilder`.
    pub fn builder() -> HuggingFaceProviderBuilder {
        HuggingFaceProviderBuilder::new()
    }

    /// Model identifier requests are sent to.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model_id)
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> PromptPixError {
        if status == 429 {
            let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
            return PromptPixError::RateLimited { retry_after };
        }
        if text.to_lowercase().contains(RESOURCE_EXHAUSTED_MARKER) {
            return PromptPixError::ResourceExhausted(sanitize_error_message(text));
        }
        let message = sanitize_error_message(&extract_error_message(text));
        if status == 401 || status == 403 {
            return PromptPixError::Upstream {
                status: Some(status),
                message: format!("inference API token rejected: {message}"),
            };
        }
        PromptPixError::Upstream {
            status: Some(status),
            message,
        }
    }
}

/// Pulls `error` out of a JSON error body, falling back to the raw text.
fn extract_error_message(text: &str) -> String {
    serde_json::from_str::<InferenceJsonResponse>(text)
        .ok()
        .and_then(|body| body.error)
        .unwrap_or_else(|| text.to_string())
}

#[async_trait]
impl ImageProvider for HuggingFaceProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let start = Instant::now();
        let body = InferenceRequest::from_generation_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("Accept", "image/png")
            .timeout(request.deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PromptPixError::Timeout(request.deadline)
                } else {
                    PromptPixError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text, &headers));
        }

        let headers = response.headers().clone();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                PromptPixError::Timeout(request.deadline)
            } else {
                PromptPixError::Network(e)
            }
        })?;

        // Some deployments wrap the image in JSON instead of returning raw bytes.
        let data = if content_type.starts_with("application/json") {
            let text = String::from_utf8_lossy(&bytes);
            let json: InferenceJsonResponse = serde_json::from_str(&text)?;
            match json.image {
                Some(b64) => base64::engine::general_purpose::STANDARD
                    .decode(b64.trim())
                    .map_err(|e| PromptPixError::Decode(e.to_string()))?,
                None => return Err(self.parse_error(status.as_u16(), &text, &headers)),
            }
        } else {
            bytes.to_vec()
        };

        let format = ImageFormat::from_magic_bytes(&data)
            .or_else(|| ImageFormat::from_mime_type(&content_type))
            .ok_or_else(|| {
                PromptPixError::Decode(format!(
                    "response is not a recognised image (content-type {content_type:?})"
                ))
            })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %self.model_id,
            bytes = data.len(),
            duration_ms,
            "inference call succeeded"
        );

        Ok(GeneratedImage::new(
            data,
            format,
            GenerationMetadata {
                model: Some(self.model_id.clone()),
                seed: request.parameters.seed,
                duration_ms: Some(duration_ms),
                attempts: request.attempt + 1,
            },
        ))
    }

    fn name(&self) -> &str {
        "Hugging Face Inference"
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint())
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(PromptPixError::Configuration(
                "inference API token rejected".into(),
            )),
            s if !(200..300).contains(&s) => Err(PromptPixError::Upstream {
                status: Some(s),
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: String,
    parameters: &'a InferenceParameters,
}

impl<'a> InferenceRequest<'a> {
    fn from_generation_request(req: &'a GenerationRequest) -> Self {
        Self {
            inputs: req.submitted_prompt(),
            parameters: &req.parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InferenceJsonResponse {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
