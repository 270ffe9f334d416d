//! Generation client - rate limiting, retries, and request lifecycle.

use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use rand::Rng;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{GenerateError, GenerateResult};
use crate::generate::prompt::{build_request, DEFAULT_PROMPT_TEMPLATE};
use crate::types::generation::{GenerationRequest, GenerationResult, ModelParams, TokenUsage};
use crate::types::record::ExtractionRecord;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Raw output of one completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// A completion provider.
///
/// Implementations wrap a specific service and map its failures onto the
/// [`GenerateError`] taxonomy; the client decides what gets retried.
#[async_trait]
pub trait Model: Send + Sync {
    /// Execute one completion call. No retries here.
    async fn complete(&self, request: &GenerationRequest) -> GenerateResult<Completion>;

    /// Provider name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Turns extraction records into generation results.
///
/// One client is shared (via `Arc`) by every worker, so its token-bucket
/// limiter bounds the aggregate request rate across all concurrent calls.
/// Callers suspend on the limiter until a slot is available.
pub struct GenerationClient<M: Model> {
    model: M,
    limiter: Arc<DefaultRateLimiter>,
    retry_limit: u32,
    initial_delay: Duration,
    max_delay: Duration,
    truncation_budget: usize,
}

impl<M: Model> GenerationClient<M> {
    /// Create a client with the given aggregate quota.
    pub fn new(model: M, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).expect("requests_per_second must be > 0"),
        );
        Self {
            model,
            limiter: Arc::new(RateLimiter::direct(quota)),
            retry_limit: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            truncation_budget: 12_000,
        }
    }

    /// Set the transient-failure retry limit.
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Set the prompt character budget.
    pub fn with_truncation_budget(mut self, chars: usize) -> Self {
        self.truncation_budget = chars;
        self
    }

    /// Set the backoff schedule.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    /// Exponential backoff with ±25% jitter to avoid thundering herd.
    fn retry_delay(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << retry.min(16).saturating_sub(1));
        let capped = exp.min(max);

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0.75..=1.25);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }

    /// Generate derived text for a record.
    ///
    /// The retry loop is explicit: the budget is `retry_limit` retries on
    /// top of the initial attempt. Transient failures back off and retry;
    /// non-retryable failures surface immediately without consuming
    /// budget.
    pub async fn generate(
        &self,
        record: &ExtractionRecord,
        template: Option<&str>,
        params: ModelParams,
    ) -> GenerateResult<GenerationResult> {
        let template = template.unwrap_or(DEFAULT_PROMPT_TEMPLATE);
        let request = build_request(record, template, params, self.truncation_budget);

        if request.truncated {
            debug!(
                url = %record.source_url,
                budget = self.truncation_budget,
                "prompt body truncated to character budget"
            );
        }

        let mut retries = 0u32;
        loop {
            self.limiter.until_ready().await;

            match self.model.complete(&request).await {
                Ok(completion) => {
                    return Ok(GenerationResult {
                        text: completion.text,
                        usage: completion.usage,
                        completed_at: Utc::now(),
                        truncated: request.truncated,
                        attempts: retries + 1,
                    });
                }
                Err(err) if err.is_transient() => {
                    if retries >= self.retry_limit {
                        return Err(GenerateError::Exhausted {
                            attempts: retries + 1,
                            last: Box::new(err),
                        });
                    }
                    retries += 1;
                    let delay = self.retry_delay(retries);
                    warn!(
                        url = %record.source_url,
                        retry = retries,
                        limit = self.retry_limit,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient generation failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Provider name of the wrapped model.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockModel, TransientKind};
    use crate::types::record::ExtractionRecord;
    use std::time::Instant;

    fn record() -> ExtractionRecord {
        ExtractionRecord::new("https://acme.example", "Acme", "Body text.", vec![])
    }

    #[tokio::test]
    async fn success_after_transient_failures() {
        let model = MockModel::new()
            .with_response("derived text")
            .with_transient_failures(2, TransientKind::Timeout);
        let client = GenerationClient::new(model, 100)
            .with_retry_limit(3)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2));

        let result = client
            .generate(&record(), None, ModelParams::new("m"))
            .await
            .unwrap();

        assert_eq!(result.text, "derived text");
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn exhausts_after_exact_budget() {
        let model = MockModel::new().always_fail_transient(TransientKind::Timeout);
        let calls = model.call_count_handle();
        let client = GenerationClient::new(model, 100)
            .with_retry_limit(2)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2));

        let err = client
            .generate(&record(), None, ModelParams::new("m"))
            .await
            .unwrap_err();

        // retry_limit = 2 means exactly 3 calls: initial + 2 retries.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(matches!(err, GenerateError::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn rejected_is_never_retried() {
        let model = MockModel::new().always_reject("invalid credentials");
        let calls = model.call_count_handle();
        let client = GenerationClient::new(model, 100).with_retry_limit(5);

        let err = client
            .generate(&record(), None, ModelParams::new("m"))
            .await
            .unwrap_err();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(matches!(err, GenerateError::Rejected { .. }));
    }

    #[tokio::test]
    async fn rate_limiter_paces_calls() {
        let model = MockModel::new().with_response("ok");
        let client = GenerationClient::new(model, 2);

        let start = Instant::now();
        for _ in 0..3 {
            client
                .generate(&record(), None, ModelParams::new("m"))
                .await
                .unwrap();
        }
        let elapsed = start.elapsed();

        // 3 calls at 2/sec: the third must wait for a slot.
        assert!(
            elapsed.as_millis() >= 500,
            "rate limiting not applied: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn result_records_truncation() {
        let model = MockModel::new().with_response("ok");
        let client = GenerationClient::new(model, 100).with_truncation_budget(40);

        let long = ExtractionRecord::new(
            "https://acme.example",
            "Acme",
            "word ".repeat(100),
            vec![],
        );
        let result = client
            .generate(&long, Some("{body}"), ModelParams::new("m"))
            .await
            .unwrap();

        assert!(result.truncated);
    }
}
