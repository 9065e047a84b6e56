//! Error types for generation, persistence and sign-in.

use std::time::Duration;

/// Longest upstream message kept in an error before truncation.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while generating, saving or authenticating.
#[derive(Debug, thiserror::Error)]
pub enum PromptPixError {
    /// Required setting (e.g. the inference API key) is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Action attempted without a signed-in user.
    #[error("not signed in")]
    NoSession,

    /// Prompt was empty or whitespace only.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// No response arrived within the per-attempt deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream failed in a way that is not retried, or retries ran out.
    #[error("upstream error: {}", format_upstream(.status, .message))]
    Upstream {
        /// HTTP status, absent for transport-level failures.
        status: Option<u16>,
        /// Sanitized upstream message.
        message: String,
    },

    /// Upstream answered 429 for this attempt.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-provided `Retry-After` hint.
        retry_after: Option<Duration>,
    },

    /// Inference backend ran out of resources for this attempt.
    #[error("inference backend out of resources: {0}")]
    ResourceExhausted(String),

    /// Record store failed.
    #[error("store error: {0}")]
    Store(String),

    /// Identity provider rejected the request.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be decoded into an image.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_upstream(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("{status} - {message}"),
        None => message.to_string(),
    }
}

impl From<sqlx::Error> for PromptPixError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for PromptPixError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Store(format!("migration failed: {err}"))
    }
}

impl PromptPixError {
    /// Returns the server-directed retry delay, if the upstream sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Converts a per-attempt failure into the error surfaced once retries
    /// are exhausted.
    ///
    /// Timeouts stay timeouts; every other transient class becomes
    /// [`PromptPixError::Upstream`].
    pub fn into_exhausted(self) -> Self {
        match self {
            Self::RateLimited { .. } => Self::Upstream {
                status: Some(429),
                message: "rate limit persisted after retries".into(),
            },
            Self::ResourceExhausted(message) => Self::Upstream {
                status: None,
                message,
            },
            Self::Network(err) => Self::Upstream {
                status: err.status().map(|s| s.as_u16()),
                message: sanitize_error_message(&err.to_string()),
            },
            other => other,
        }
    }

    /// Short human-readable notification for this failure class.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => format!("Setup problem: {msg}"),
            Self::NoSession => "Please sign in first.".into(),
            Self::EmptyPrompt => "Please enter a prompt.".into(),
            Self::Timeout(_) => {
                "The image service did not respond in time. Please try again.".into()
            }
            Self::Upstream { .. } | Self::RateLimited { .. } | Self::ResourceExhausted(_) => {
                format!("Image generation failed: {self}")
            }
            Self::Network(_) => "Could not reach the image service.".into(),
            Self::Store(msg) => format!("Could not save to history: {msg}"),
            Self::Auth(msg) => format!("Sign-in failed: {msg}"),
            Self::Decode(_) => "The image service returned an unreadable image.".into(),
            Self::Io(err) => format!("File error: {err}"),
            Self::Json(err) => format!("Unexpected response: {err}"),
        }
    }
}

/// Parses a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Redacts bearer tokens and truncates long upstream messages.
pub(crate) fn sanitize_error_message(message: &str) -> String {
    let mut redacted = String::with_capacity(message.len());
    let mut words = message.split(' ').peekable();
    while let Some(word) = words.next() {
        redacted.push_str(word);
        if word.eq_ignore_ascii_case("bearer") && words.peek().is_some() {
            words.next();
            redacted.push_str(" [redacted]");
        }
        if words.peek().is_some() {
            redacted.push(' ');
        }
    }

    let trimmed = redacted.trim();
    if trimmed.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let cut: String = trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

/// Result type alias for promptpix operations.
pub type Result<T> = std::result::Result<T, PromptPixError>;
