//! Core types for image generation.

use crate::error::{PromptPixError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-attempt wait bound used when the caller does not set one.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Maps a `Content-Type` value to a format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Diffusion parameters sent alongside the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceParameters {
    /// Things the image should not contain.
    pub negative_prompt: String,
    /// Number of denoising steps.
    pub num_inference_steps: u32,
    /// Classifier-free guidance scale.
    pub guidance_scale: f32,
    /// Output height in pixels.
    pub height: u32,
    /// Output width in pixels.
    pub width: u32,
    /// Sampling seed. Drawn fresh per attempt when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for InferenceParameters {
    fn default() -> Self {
        Self {
            negative_prompt: "blurry, low quality, distorted, deformed, watermark, text".into(),
            num_inference_steps: 30,
            guidance_scale: 7.5,
            height: 1024,
            width: 1024,
            seed: None,
        }
    }
}

/// A single image generation request.
///
/// `prompt` is what the user typed; the provider submits
/// [`GenerationRequest::submitted_prompt`], which appends the style suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The text prompt as entered by the user.
    pub prompt: String,
    /// Style text appended before submission.
    pub style_suffix: Option<String>,
    /// Zero-based attempt counter.
    pub attempt: u32,
    /// Bound on the wait for one attempt.
    pub deadline: Duration,
    /// Diffusion parameters.
    pub parameters: InferenceParameters,
}

impl GenerationRequest {
    /// Creates a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style_suffix: None,
            attempt: 0,
            deadline: DEFAULT_DEADLINE,
            parameters: InferenceParameters::default(),
        }
    }

    /// Sets the style suffix appended on submission.
    pub fn with_style_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.style_suffix = Some(suffix.into());
        self
    }

    /// Sets the per-attempt wait bound.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Replaces the diffusion parameters.
    pub fn with_parameters(mut self, parameters: InferenceParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Pins the seed for every attempt.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.parameters.seed = Some(seed);
        self
    }

    /// Returns the prompt as sent upstream.
    pub fn submitted_prompt(&self) -> String {
        match &self.style_suffix {
            Some(suffix) => format!("{}{}", self.prompt, suffix),
            None => self.prompt.clone(),
        }
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Seed of the successful attempt.
    pub seed: Option<u64>,
    /// Duration of the successful attempt in milliseconds.
    pub duration_ms: Option<u64>,
    /// Total attempts made, including the successful one.
    pub attempts: u32,
}

/// A generated image with its data and metadata.
#[derive(Debug, Clone)]
#[must_use = "generated image should be saved or processed"]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(data: Vec<u8>, format: ImageFormat, metadata: GenerationMetadata) -> Self {
        Self {
            data,
            format,
            metadata,
        }
    }

    /// Creates a new generated image, detecting format from magic bytes.
    pub fn from_bytes(data: Vec<u8>, metadata: GenerationMetadata) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| PromptPixError::Decode("Unknown image format".into()))?;
        Ok(Self::new(data, format, metadata))
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            self.to_base64()
        )
    }
}

/// Outcome of a successful generation: the image plus the prompt the user
/// actually typed.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The generated image.
    pub image: GeneratedImage,
    /// Undecorated prompt.
    pub source_prompt: String,
}

impl GenerationResult {
    /// Text reference to the image, suitable for storing in a record.
    pub fn image_reference(&self) -> String {
        self.image.to_data_url()
    }
}
