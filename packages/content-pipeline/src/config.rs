//! Pipeline configuration and credential handling.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use std::time::Duration;

use crate::error::PipelineError;

/// Completion-service credential that stays out of logs and debug output.
pub struct ApiCredential(SecretBox<str>);

impl ApiCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// The raw credential, for building an authorization header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ApiCredential {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for ApiCredential {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ApiCredential {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Configuration for a pipeline run.
///
/// The credential is sourced by the caller (environment, vault, etc.);
/// the pipeline only carries it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of pooled browser sessions, which is also the number of
    /// concurrent workers. Must be >= 1.
    pub session_pool_size: usize,

    /// Deadline for a navigation plus its wait condition.
    pub navigation_timeout: Duration,

    /// Retries allowed for transient navigation failures per target.
    pub extraction_retry_limit: u32,

    /// Retries allowed for transient completion failures per request.
    pub generation_retry_limit: u32,

    /// Aggregate completion request quota, in requests per second.
    pub generation_rate_limit: u32,

    /// Character budget for a rendered prompt. Bodies are cut to fit.
    pub context_truncation_budget: usize,

    /// Model identifier passed to the completion service.
    pub model_identifier: String,

    /// Credential for the completion service.
    pub api_credential: ApiCredential,

    /// How long in-flight operations may run after cancellation before
    /// they are abandoned.
    pub cancel_grace: Duration,

    /// First retry delay for the generation backoff schedule.
    pub initial_retry_delay: Duration,

    /// Ceiling for the generation backoff schedule.
    pub max_retry_delay: Duration,
}

impl PipelineConfig {
    /// Create a config with defaults for everything but the credential.
    pub fn new(api_credential: impl Into<ApiCredential>) -> Self {
        Self {
            session_pool_size: 2,
            navigation_timeout: Duration::from_secs(30),
            extraction_retry_limit: 3,
            generation_retry_limit: 2,
            generation_rate_limit: 2,
            context_truncation_budget: 12_000,
            model_identifier: "gpt-4o-mini".to_string(),
            api_credential: api_credential.into(),
            cancel_grace: Duration::from_secs(5),
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(8),
        }
    }

    /// Set the session pool size.
    pub fn with_session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = size;
        self
    }

    /// Set the navigation deadline.
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set the extraction retry limit.
    pub fn with_extraction_retry_limit(mut self, limit: u32) -> Self {
        self.extraction_retry_limit = limit;
        self
    }

    /// Set the generation retry limit.
    pub fn with_generation_retry_limit(mut self, limit: u32) -> Self {
        self.generation_retry_limit = limit;
        self
    }

    /// Set the completion request quota (requests per second).
    pub fn with_generation_rate_limit(mut self, rps: u32) -> Self {
        self.generation_rate_limit = rps;
        self
    }

    /// Set the prompt character budget.
    pub fn with_context_truncation_budget(mut self, chars: usize) -> Self {
        self.context_truncation_budget = chars;
        self
    }

    /// Set the model identifier.
    pub fn with_model_identifier(mut self, model: impl Into<String>) -> Self {
        self.model_identifier = model.into();
        self
    }

    /// Set the cancellation grace period.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Set the generation backoff schedule.
    pub fn with_retry_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_retry_delay = initial;
        self.max_retry_delay = max;
        self
    }

    /// Validate the configuration before starting a run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.session_pool_size == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "session_pool_size must be >= 1".into(),
            });
        }
        if self.generation_rate_limit == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "generation_rate_limit must be >= 1".into(),
            });
        }
        if self.context_truncation_budget == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "context_truncation_budget must be > 0".into(),
            });
        }
        Ok(())
    }
}
