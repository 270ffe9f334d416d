//! Typed errors for the content pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure mode of each component.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the browser session layer.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Browser process could not be started or attached.
    #[error("failed to launch browser: {0}")]
    Launch(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The wait condition was not satisfied within the deadline.
    #[error("navigation timed out: {url}")]
    NavigationTimeout { url: String },

    /// The underlying browser process became unresponsive.
    #[error("browser session crashed: {session_id}")]
    SessionCrashed { session_id: String },

    /// DevTools protocol command failed.
    #[error("protocol error: {0}")]
    Protocol(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The session pool has been shut down.
    #[error("session pool is closed")]
    PoolClosed,
}

impl BrowserError {
    /// Transient failures are retried against a fresh session; everything
    /// else is terminal for the target.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowserError::NavigationTimeout { .. } | BrowserError::SessionCrashed { .. }
        )
    }
}

/// Errors raised when converting rendered markup into a record.
///
/// These are content errors: retrying the same markup cannot fix them.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// None of the body selectors matched any content.
    #[error("no content matched the body selectors")]
    EmptyContent,

    /// A field marked required in the selector spec was absent.
    #[error("required field missing: {field}")]
    MissingField { field: String },
}

/// Errors raised by the generation client.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The completion service rejected the request due to quota.
    #[error("rate limited by completion service")]
    RateLimited,

    /// The completion request timed out.
    #[error("completion request timed out")]
    Timeout,

    /// 5xx-class service failure.
    #[error("completion service unavailable: HTTP {status}")]
    ServiceUnavailable { status: u16 },

    /// Transport-level failure reaching the service.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The service refused the request; retrying cannot fix this
    /// (bad credentials, malformed request).
    #[error("request rejected: {reason}")]
    Rejected { reason: String },

    /// The response was missing the expected completion field.
    #[error("malformed completion response: {reason}")]
    Malformed { reason: String },

    /// The retry budget was exhausted on transient failures.
    #[error("generation exhausted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<GenerateError>,
    },
}

impl GenerateError {
    /// Whether this failure is expected to self-resolve on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerateError::RateLimited
                | GenerateError::Timeout
                | GenerateError::ServiceUnavailable { .. }
                | GenerateError::Transport(_)
        )
    }
}

/// Errors raised by the export sink.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Write failure. Reported to the caller; never changes a target's
    /// pipeline status.
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The target has not produced the data this artifact needs yet.
    #[error("target {target_id} has no generated output to export")]
    TargetIncomplete { target_id: uuid::Uuid },
}

/// Errors raised when starting a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Terminal reason codes carried on a failed target.
///
/// Every target that ends `Failed` carries exactly one of these plus the
/// last-seen error detail; no target is silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NavigationTimeout,
    SessionCrashed,
    ExtractionEmpty,
    GenerationExhausted,
    GenerationRejected,
    GenerationMalformed,
    Cancelled,
}

impl FailureKind {
    /// Map a browser error to its terminal reason code.
    pub fn from_browser(err: &BrowserError) -> Self {
        match err {
            BrowserError::NavigationTimeout { .. } => FailureKind::NavigationTimeout,
            _ => FailureKind::SessionCrashed,
        }
    }

    /// Map a generation error to its terminal reason code.
    pub fn from_generate(err: &GenerateError) -> Self {
        match err {
            GenerateError::Rejected { .. } => FailureKind::GenerationRejected,
            GenerateError::Malformed { .. } => FailureKind::GenerationMalformed,
            _ => FailureKind::GenerationExhausted,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::NavigationTimeout => "navigation_timeout",
            FailureKind::SessionCrashed => "session_crashed",
            FailureKind::ExtractionEmpty => "extraction_empty",
            FailureKind::GenerationExhausted => "generation_exhausted",
            FailureKind::GenerationRejected => "generation_rejected",
            FailureKind::GenerationMalformed => "generation_malformed",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Result type alias for browser operations.
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Result type alias for extraction operations.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Result type alias for generation operations.
pub type GenerateResult<T> = std::result::Result<T, GenerateError>;

/// Result type alias for export operations.
pub type ExportResult<T> = std::result::Result<T, ExportError>;
