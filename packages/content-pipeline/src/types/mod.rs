//! Core data types for the pipeline.

pub mod generation;
pub mod record;
pub mod run;
pub mod target;

pub use generation::{GenerationRequest, GenerationResult, ModelParams, TokenUsage};
pub use record::{ExtractedField, ExtractionRecord};
pub use run::{PipelineRun, RunSummary};
pub use target::{Target, TargetSpec, TargetStatus};
