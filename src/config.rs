//! Application settings: defaults, optional TOML file, environment overrides.

use crate::controller::DEFAULT_STYLE_SUFFIX;
use crate::error::{PromptPixError, Result};
use crate::image::providers::{HuggingFaceModel, API_KEY_ENV};
use crate::image::InferenceParameters;
use crate::session::providers::{AUTH_KEY_ENV, AUTH_URL_ENV};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File read when no explicit config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "promptpix.toml";

/// Runtime settings.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Inference API token. Never written to logs.
    pub api_token: Option<String>,
    /// Inference host.
    pub endpoint: String,
    /// Hub model identifier.
    pub model: String,
    /// Database URL for the record store.
    pub database_url: String,
    /// Identity provider URL.
    pub auth_url: Option<String>,
    /// Identity provider public key.
    pub auth_key: Option<String>,
    /// Style text appended to prompts.
    pub style_suffix: String,
    /// Per-attempt wait bound in seconds.
    pub timeout_secs: u64,
    /// Directory generated images are written to.
    pub output_dir: PathBuf,
    /// Diffusion parameters.
    pub parameters: InferenceParameters,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: None,
            endpoint: "https://api-inference.huggingface.co".into(),
            model: HuggingFaceModel::default().as_str().into(),
            database_url: "sqlite://./data/promptpix.db".into(),
            auth_url: None,
            auth_key: None,
            style_suffix: DEFAULT_STYLE_SUFFIX.into(),
            timeout_secs: 30,
            output_dir: PathBuf::from("./images"),
            parameters: InferenceParameters::default(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_token", &self.api_token.as_ref().map(|_| "[redacted]"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("database_url", &self.database_url)
            .field("auth_url", &self.auth_url)
            .field("style_suffix", &self.style_suffix)
            .field("timeout_secs", &self.timeout_secs)
            .field("output_dir", &self.output_dir)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Loads settings from `path` (or `promptpix.toml` if present), then
    /// applies environment overrides.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Parses a TOML settings file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PromptPixError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let settings: Self = toml::from_str(&raw).map_err(|e| {
            PromptPixError::Configuration(format!("invalid {}: {e}", path.display()))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values that would make every attempt fail.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(PromptPixError::Configuration(
                "timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Overrides fields from environment-style lookups.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(API_KEY_ENV) {
            self.api_token = Some(v);
        }
        if let Some(v) = lookup("PROMPTPIX_ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = lookup("PROMPTPIX_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("PROMPTPIX_DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup(AUTH_URL_ENV) {
            self.auth_url = Some(v);
        }
        if let Some(v) = lookup(AUTH_KEY_ENV) {
            self.auth_key = Some(v);
        }
        if let Some(v) = lookup("PROMPTPIX_STYLE_SUFFIX") {
            self.style_suffix = v;
        }
        if let Some(v) = lookup("PROMPTPIX_TIMEOUT_SECS") {
            match v.parse() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid PROMPTPIX_TIMEOUT_SECS"),
            }
        }
        if let Some(v) = lookup("PROMPTPIX_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
    }

    /// Per-attempt wait bound.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
