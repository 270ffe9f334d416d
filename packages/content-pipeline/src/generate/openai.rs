//! OpenAI-compatible implementation of the [`Model`] trait.
//!
//! Works against api.openai.com or any compatible endpoint (Azure,
//! LM Studio, proxies) via `with_base_url`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ApiCredential;
use crate::error::{GenerateError, GenerateResult};
use crate::generate::client::{Completion, Model};
use crate::types::generation::{GenerationRequest, TokenUsage};

/// Chat-completions client for OpenAI-compatible services.
pub struct OpenAiModel {
    client: Client,
    credential: ApiCredential,
    base_url: String,
}

impl OpenAiModel {
    /// Create a client for the given credential.
    pub fn new(credential: impl Into<ApiCredential>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("failed to create HTTP client"),
            credential: credential.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Set a custom base URL (for Azure, local servers, proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set a custom HTTP client (e.g. different timeout).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl Model for OpenAiModel {
    async fn complete(&self, request: &GenerationRequest) -> GenerateResult<Completion> {
        let body = ChatRequest {
            model: request.params.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.credential.expose()),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerateError::Timeout
                } else {
                    GenerateError::Transport(Box::new(e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), detail));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            GenerateError::Malformed {
                reason: format!("invalid response body: {e}"),
            }
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerateError::Malformed {
                reason: "response carried no completion text".to_string(),
            })?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(Completion { text, usage })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Map an HTTP status onto the error taxonomy.
///
/// 429 and 5xx are transient; 4xx means the request itself is bad and
/// retrying cannot fix it.
fn classify_status(status: u16, detail: String) -> GenerateError {
    match status {
        429 => GenerateError::RateLimited,
        500..=599 => GenerateError::ServiceUnavailable { status },
        401 | 403 => GenerateError::Rejected {
            reason: format!("invalid credentials (HTTP {status})"),
        },
        _ => GenerateError::Rejected {
            reason: format!("HTTP {status}: {detail}"),
        },
    }
}

// Request/Response types

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}
