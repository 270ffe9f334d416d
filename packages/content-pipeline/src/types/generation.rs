//! Generation request/result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Model parameters sent with each completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    /// Model identifier understood by the completion service.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Completion length cap, in tokens.
    pub max_tokens: u32,
}

impl ModelParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.3,
            max_tokens: 1024,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A fully-rendered completion request.
///
/// Built deterministically from an extraction record; immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Rendered prompt text, already cut to the character budget.
    pub prompt: String,

    /// Model parameters.
    pub params: ModelParams,

    /// Whether the body substitution was cut to fit the budget.
    pub truncated: bool,
}

impl GenerationRequest {
    /// Prompt length in characters.
    pub fn prompt_chars(&self) -> usize {
        self.prompt.chars().count()
    }
}

/// Token accounting reported by the completion service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Derived text produced for one target. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// The generated text.
    pub text: String,

    /// Token accounting from the service (zeros when not reported).
    pub usage: TokenUsage,

    /// When the completion finished.
    pub completed_at: DateTime<Utc>,

    /// Whether the source prompt was truncated to the character budget.
    pub truncated: bool,

    /// Completion calls made, including retries.
    pub attempts: u32,
}

impl GenerationResult {
    /// First `max_chars` characters of the text, newlines flattened.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let flat: String = self
            .text
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        let mut excerpt: String = flat.chars().take(max_chars).collect();
        if flat.chars().count() > max_chars {
            excerpt.push('…');
        }
        excerpt
    }
}
