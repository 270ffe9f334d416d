//! Browser-Driven Scrape-Generate Pipeline
//!
//! Drives automated browser sessions to render target pages, extracts
//! structured content from the markup, derives text from it through an
//! LLM completion service, and exports the results as tabular and
//! document artifacts.
//!
//! # Design Philosophy
//!
//! The hard part of a scrape-generate system is coordinating unreliable,
//! stateful external resources - a browser process and a quota-limited
//! network API - without one target's trouble spilling into another:
//!
//! - Every target settles on its own; partial failure never aborts a run
//! - Transient trouble (timeouts, crashes, rate limits) retries against
//!   explicit per-stage budgets; content errors fail fast
//! - The session pool and the rate limiter are the only cross-worker
//!   state
//! - Extraction and prompt rendering are deterministic, so results are
//!   reproducible byte for byte
//!
//! # Usage
//!
//! ```rust,ignore
//! use content_pipeline::{
//!     CdpDriver, Coordinator, CsvExporter, OpenAiModel, PipelineConfig, TargetSpec,
//! };
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::new(std::env::var("OPENAI_API_KEY")?)
//!     .with_session_pool_size(4)
//!     .with_generation_rate_limit(2);
//!
//! let model = OpenAiModel::new(config.api_credential.clone());
//! let coordinator = Arc::new(Coordinator::new(
//!     CdpDriver::new(),
//!     model,
//!     CsvExporter::new(),
//!     config,
//! )?);
//!
//! let run = coordinator
//!     .run(vec![
//!         TargetSpec::new("https://example.com"),
//!         TargetSpec::new("https://example.org"),
//!     ])
//!     .await;
//!
//! let artifact = coordinator.sink().export(&run)?;
//! artifact.write_to("run.csv")?;
//! ```
//!
//! # Modules
//!
//! - [`browser`] - bounded session pool over a driver-controlled browser
//! - [`extract`] - declarative, deterministic content extraction
//! - [`generate`] - prompt rendering, rate limiting, retries, providers
//! - [`pipeline`] - the per-target state machine and worker pool
//! - [`export`] - tabular summaries and per-target documents
//! - [`testing`] - scripted mocks for driver and model

pub mod browser;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod generate;
pub mod pipeline;
pub mod testing;
pub mod types;

// Re-export core types at crate root
pub use config::{ApiCredential, PipelineConfig};
pub use error::{
    BrowserError, ExportError, ExtractError, FailureKind, GenerateError, PipelineError,
};
pub use types::{
    ExtractedField, ExtractionRecord, GenerationRequest, GenerationResult, ModelParams,
    PipelineRun, RunSummary, Target, TargetSpec, TargetStatus, TokenUsage,
};

// Re-export component surfaces
pub use browser::{CdpDriver, Driver, PooledSession, Session, SessionPool, WaitCondition};
pub use export::{
    document, sanitize_filename, CsvExporter, DocumentArtifact, ExportArtifact, ExportSink,
};
pub use extract::{extract, ExtractionSpec, FieldRule, DEFAULT_BODY_SELECTORS};
pub use generate::{
    build_request, Completion, GenerationClient, Model, OpenAiModel, DEFAULT_PROMPT_TEMPLATE,
};
pub use pipeline::{Coordinator, ProgressEvent, ProgressReceiver};
