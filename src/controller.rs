//! Generation request controller: validation, bounded retries and backoff.
//!
//! One call to [`GenerationController::generate`] drives a single request
//! through up to `1 + max_retries` attempts. Each failed attempt is
//! classified into a [`FailureKind`]; the [`RetryPolicy`] table maps that
//! kind to either a delay before the next attempt or giving up.
//!
//! | failure              | retried | delay                               |
//! |----------------------|---------|-------------------------------------|
//! | HTTP 429             | yes     | `Retry-After`, else 5 s             |
//! | resource exhausted   | yes     | 2 s                                 |
//! | attempt timed out    | yes     | 2 s                                 |
//! | transport failure    | yes     | 2 s                                 |
//! | anything else        | no      |                                     |

use crate::error::{PromptPixError, Result};
use crate::image::{
    GenerationRequest, GenerationResult, ImageProvider, InferenceParameters, DEFAULT_DEADLINE,
};
use crate::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Style text appended to every submitted prompt by default.
pub const DEFAULT_STYLE_SUFFIX: &str =
    ", highly detailed, digital art, sharp focus, trending on artstation";

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Upstream answered 429.
    RateLimited,
    /// Inference backend reported resource exhaustion.
    ResourceExhausted,
    /// No response within the attempt deadline.
    Timeout,
    /// Connection or request could not be completed.
    Transport,
    /// Not worth retrying.
    Fatal,
}

impl FailureKind {
    /// Classifies an attempt error.
    ///
    /// Transport failures are recognised through the HTTP client's error
    /// type rather than by inspecting message text. A body cut off mid-read
    /// surfaces as a body or decode error and counts as a transport failure.
    pub fn classify(err: &PromptPixError) -> Self {
        match err {
            PromptPixError::RateLimited { .. } => Self::RateLimited,
            PromptPixError::ResourceExhausted(_) => Self::ResourceExhausted,
            PromptPixError::Timeout(_) => Self::Timeout,
            PromptPixError::Network(e) if e.is_timeout() => Self::Timeout,
            PromptPixError::Network(e)
                if e.is_connect() || e.is_request() || e.is_body() || e.is_decode() =>
            {
                Self::Transport
            }
            _ => Self::Fatal,
        }
    }
}

/// How long to wait before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Use the server's hint, or the fallback when there is none.
    ServerDirected {
        /// Delay used when the server sent no hint.
        fallback: Duration,
    },
    /// Always wait this long.
    Fixed(Duration),
}

/// Entry of the retry policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRule {
    /// Whether this failure class is retried at all.
    pub retryable: bool,
    /// Delay before the next attempt.
    pub backoff: Backoff,
}

/// Retry budget and per-class backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay for 429 responses without `Retry-After`.
    pub rate_limit_fallback: Duration,
    /// Delay for resource exhaustion, timeouts and transport failures.
    pub transient_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_fallback: Duration::from_secs(5),
            transient_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Looks up the rule for a failure class.
    pub fn rule(&self, kind: FailureKind) -> RetryRule {
        match kind {
            FailureKind::RateLimited => RetryRule {
                retryable: true,
                backoff: Backoff::ServerDirected {
                    fallback: self.rate_limit_fallback,
                },
            },
            FailureKind::ResourceExhausted | FailureKind::Timeout | FailureKind::Transport => {
                RetryRule {
                    retryable: true,
                    backoff: Backoff::Fixed(self.transient_delay),
                }
            }
            FailureKind::Fatal => RetryRule {
                retryable: false,
                backoff: Backoff::Fixed(Duration::ZERO),
            },
        }
    }

    /// Returns the delay before the next attempt, or `None` to give up.
    ///
    /// `attempt` is the zero-based index of the attempt that just failed.
    pub fn next_delay(
        &self,
        kind: FailureKind,
        attempt: u32,
        hint: Option<Duration>,
    ) -> Option<Duration> {
        let rule = self.rule(kind);
        if !rule.retryable || attempt >= self.max_retries {
            return None;
        }
        Some(match rule.backoff {
            Backoff::ServerDirected { fallback } => hint.unwrap_or(fallback),
            Backoff::Fixed(delay) => delay,
        })
    }
}

/// Suspends the current request between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits for `delay`.
    async fn sleep(&self, delay: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Builder for GenerationController.
pub struct GenerationControllerBuilder {
    provider: Arc<dyn ImageProvider>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    style_suffix: String,
    deadline: Duration,
    parameters: InferenceParameters,
}

impl GenerationControllerBuilder {
    /// Sets the retry policy.
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the sleeper used between attempts.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Sets the style suffix appended to submitted prompts.
    pub fn style_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.style_suffix = suffix.into();
        self
    }

    /// Sets the per-attempt wait bound.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets the default diffusion parameters.
    pub fn parameters(mut self, parameters: InferenceParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Builds the controller.
    pub fn build(self) -> GenerationController {
        GenerationController {
            provider: self.provider,
            policy: self.policy,
            sleeper: self.sleeper,
            style_suffix: self.style_suffix,
            deadline: self.deadline,
            parameters: self.parameters,
        }
    }
}

/// Owns the lifecycle of one generation request at a time.
pub struct GenerationController {
    provider: Arc<dyn ImageProvider>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    style_suffix: String,
    deadline: Duration,
    parameters: InferenceParameters,
}

impl GenerationController {
    /// Starts building a controller around an already configured provider.
    pub fn builder(provider: Arc<dyn ImageProvider>) -> GenerationControllerBuilder {
        GenerationControllerBuilder {
            provider,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            style_suffix: DEFAULT_STYLE_SUFFIX.to_string(),
            deadline: DEFAULT_DEADLINE,
            parameters: InferenceParameters::default(),
        }
    }

    /// Generates an image for the signed-in user.
    ///
    /// Session and prompt are validated before any network call. Transient
    /// upstream failures are retried per the policy; the last error is
    /// surfaced once the budget is spent.
    pub async fn generate(&self, prompt: &str, session: &Session) -> Result<GenerationResult> {
        let identity = session.identity().ok_or(PromptPixError::NoSession)?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(PromptPixError::EmptyPrompt);
        }

        let pinned_seed = self.parameters.seed;
        let mut request = GenerationRequest::new(prompt)
            .with_style_suffix(self.style_suffix.clone())
            .with_deadline(self.deadline)
            .with_parameters(self.parameters.clone());

        loop {
            request.parameters.seed = Some(pinned_seed.unwrap_or_else(random_seed));
            tracing::debug!(
                user_id = %identity.user_id,
                attempt = request.attempt,
                seed = request.parameters.seed,
                "submitting generation request"
            );

            let outcome =
                match tokio::time::timeout(request.deadline, self.provider.generate(&request))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => Err(PromptPixError::Timeout(request.deadline)),
                };

            let err = match outcome {
                Ok(mut image) => {
                    image.metadata.attempts = request.attempt + 1;
                    tracing::info!(
                        user_id = %identity.user_id,
                        attempts = image.metadata.attempts,
                        bytes = image.size(),
                        "generation succeeded"
                    );
                    return Ok(GenerationResult {
                        image,
                        source_prompt: request.prompt,
                    });
                }
                Err(err) => err,
            };

            let kind = FailureKind::classify(&err);
            match self
                .policy
                .next_delay(kind, request.attempt, err.retry_after())
            {
                Some(delay) => {
                    tracing::warn!(
                        attempt = request.attempt + 1,
                        max_retries = self.policy.max_retries,
                        ?kind,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient error: {err}"
                    );
                    self.sleeper.sleep(delay).await;
                    request.attempt += 1;
                }
                None => {
                    tracing::warn!(
                        attempts = request.attempt + 1,
                        ?kind,
                        "generation failed: {err}"
                    );
                    return Err(match kind {
                        FailureKind::Fatal => err,
                        _ => err.into_exhausted(),
                    });
                }
            }
        }
    }
}

fn random_seed() -> u64 {
    rand::random::<u32>() as u64
}
