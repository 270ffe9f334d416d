//! Generation - derived text from extraction records.
//!
//! The client owns prompt building, the shared rate limiter, and the
//! retry loop; concrete providers implement [`Model`].

pub mod client;
pub mod openai;
pub mod prompt;

pub use client::{Completion, GenerationClient, Model};
pub use openai::OpenAiModel;
pub use prompt::{build_request, DEFAULT_PROMPT_TEMPLATE};
