//! The coordinator - drives targets through the stage sequence.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::pool::SessionPool;
use crate::browser::session::Driver;
use crate::config::PipelineConfig;
use crate::error::{BrowserError, ExtractError, FailureKind, PipelineError};
use crate::export::ExportSink;
use crate::extract;
use crate::generate::client::{GenerationClient, Model};
use crate::pipeline::progress::{ProgressFeed, ProgressReceiver};
use crate::types::generation::ModelParams;
use crate::types::record::ExtractionRecord;
use crate::types::run::PipelineRun;
use crate::types::target::{Target, TargetSpec, TargetStatus};

/// Why a stage attempt did not produce a result.
enum StageError {
    Browser(BrowserError),
    Content(ExtractError),
    Cancelled,
}

/// Outcome of racing an in-flight operation against cancellation.
enum Raced<T> {
    Done(T),
    Abandoned,
}

/// Drives targets through the pipeline with a bounded worker pool.
///
/// Workers run in parallel, one target each; stages within a worker run
/// strictly in sequence. The session pool and the generation client's
/// rate limiter are the only state shared across workers.
pub struct Coordinator<D, M, E>
where
    D: Driver,
    M: Model + 'static,
    E: ExportSink + 'static,
{
    config: PipelineConfig,
    pool: Arc<SessionPool<D>>,
    client: Arc<GenerationClient<M>>,
    sink: Arc<E>,
    cancel: CancellationToken,
    progress: ProgressFeed,
    progress_rx: Mutex<Option<ProgressReceiver>>,
}

impl<D, M, E> Coordinator<D, M, E>
where
    D: Driver,
    M: Model + 'static,
    E: ExportSink + 'static,
{
    /// Build a coordinator from its collaborators.
    pub fn new(driver: D, model: M, sink: E, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let pool = Arc::new(SessionPool::new(driver, config.session_pool_size));
        let client = Arc::new(
            GenerationClient::new(model, config.generation_rate_limit)
                .with_retry_limit(config.generation_retry_limit)
                .with_truncation_budget(config.context_truncation_budget)
                .with_backoff(config.initial_retry_delay, config.max_retry_delay),
        );
        let (progress, progress_rx) = ProgressFeed::channel();

        Ok(Self {
            config,
            pool,
            client,
            sink: Arc::new(sink),
            cancel: CancellationToken::new(),
            progress,
            progress_rx: Mutex::new(Some(progress_rx)),
        })
    }

    /// Take the progress stream. Yields `None` after the first call.
    pub fn subscribe(&self) -> Option<ProgressReceiver> {
        self.progress_rx
            .lock()
            .expect("progress lock poisoned")
            .take()
    }

    /// Token the caller can use to request shutdown.
    ///
    /// Once cancelled, no target enters a new stage; in-flight operations
    /// get `cancel_grace` to finish before they are abandoned.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The export sink, for producing artifacts after the run.
    pub fn sink(&self) -> &Arc<E> {
        &self.sink
    }

    /// Tear down pooled browser sessions.
    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    /// Process every target to a settled state and return the run.
    ///
    /// Partial failure never aborts the run: each target settles on its
    /// own, and one target's failure never blocks another.
    pub async fn run(self: &Arc<Self>, specs: Vec<TargetSpec>) -> PipelineRun {
        let mut run = PipelineRun::new();
        let total = specs.len();
        info!(
            run_id = %run.id,
            targets = total,
            workers = self.config.session_pool_size,
            "pipeline run starting"
        );

        let queue: Arc<Mutex<VecDeque<Target>>> = Arc::new(Mutex::new(
            specs.into_iter().map(Target::from_spec).collect(),
        ));
        let done: Arc<Mutex<Vec<Target>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));

        let mut workers = JoinSet::new();
        for worker in 0..self.config.session_pool_size {
            let this = Arc::clone(self);
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            workers.spawn(async move {
                loop {
                    let next = queue.lock().expect("queue lock poisoned").pop_front();
                    let Some(target) = next else { break };
                    debug!(worker, target_id = %target.id, url = %target.url, "worker picked target");
                    let settled = this.process_target(target).await;
                    done.lock().expect("done lock poisoned").push(settled);
                }
            });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "pipeline worker terminated abnormally");
            }
        }

        run.targets = std::mem::take(&mut *done.lock().expect("done lock poisoned"));
        run.finalize();

        let summary = run.summary();
        info!(
            run_id = %run.id,
            exported = summary.exported,
            failed = summary.failed,
            "pipeline run finished"
        );
        run
    }

    /// Drive one target through all stages sequentially.
    async fn process_target(&self, mut target: Target) -> Target {
        // Extraction stage, with a retry budget for transient navigation
        // failures.
        if self.cancel.is_cancelled() {
            self.fail(&mut target, FailureKind::Cancelled, "run cancelled");
            return target;
        }
        self.advance(&mut target, TargetStatus::Extracting, None);

        loop {
            target.extraction_attempts += 1;
            match self.extract_once(&target).await {
                Ok(record) => {
                    let from = target.status;
                    target.attach_record(record);
                    self.progress.emit(&target, from, None);
                    break;
                }
                Err(StageError::Cancelled) => {
                    self.fail(&mut target, FailureKind::Cancelled, "run cancelled");
                    return target;
                }
                Err(StageError::Content(e)) => {
                    self.fail(&mut target, FailureKind::ExtractionEmpty, e.to_string());
                    return target;
                }
                Err(StageError::Browser(e)) if e.is_transient() => {
                    if target.extraction_attempts > self.config.extraction_retry_limit {
                        self.fail(&mut target, FailureKind::from_browser(&e), e.to_string());
                        return target;
                    }
                    target.last_error = Some(e.to_string());
                    warn!(
                        target_id = %target.id,
                        url = %target.url,
                        attempt = target.extraction_attempts,
                        limit = self.config.extraction_retry_limit,
                        error = %e,
                        "transient extraction failure, retrying"
                    );
                }
                Err(StageError::Browser(e)) => {
                    let kind = match e {
                        BrowserError::PoolClosed => FailureKind::Cancelled,
                        _ => FailureKind::from_browser(&e),
                    };
                    self.fail(&mut target, kind, e.to_string());
                    return target;
                }
            }
        }

        // Generation stage. Retries live inside the client; cancellation
        // gets the same grace treatment as navigation.
        if self.cancel.is_cancelled() {
            self.fail(&mut target, FailureKind::Cancelled, "run cancelled");
            return target;
        }
        // Entry into Generating requires a non-empty record.
        let Some(record) = target.record.clone() else {
            debug_assert!(false, "generating without a record");
            self.fail(&mut target, FailureKind::ExtractionEmpty, "record missing");
            return target;
        };
        if !record.has_content() {
            self.fail(&mut target, FailureKind::ExtractionEmpty, "record body is empty");
            return target;
        }
        self.advance(&mut target, TargetStatus::Generating, None);

        let params = ModelParams::new(self.config.model_identifier.clone());
        let outcome = {
            let fut = self
                .client
                .generate(&record, target.prompt_template.as_deref(), params);
            tokio::pin!(fut);
            tokio::select! {
                res = &mut fut => Raced::Done(res),
                _ = self.cancel.cancelled() => {
                    match tokio::time::timeout(self.config.cancel_grace, &mut fut).await {
                        Ok(res) => Raced::Done(res),
                        Err(_) => Raced::Abandoned,
                    }
                }
            }
        };

        match outcome {
            Raced::Done(Ok(result)) => {
                let from = target.status;
                target.attach_generation(result);
                self.progress.emit(&target, from, None);
            }
            Raced::Done(Err(e)) => {
                if let crate::error::GenerateError::Exhausted { attempts, .. } = &e {
                    target.generation_attempts = *attempts;
                }
                self.fail(&mut target, FailureKind::from_generate(&e), e.to_string());
                return target;
            }
            Raced::Abandoned => {
                // The in-flight call outlived the grace period; its result
                // is discarded.
                self.fail(&mut target, FailureKind::Cancelled, "generation abandoned");
                return target;
            }
        }

        // Export stage. A sink failure is reported but never changes the
        // target's pipeline status.
        match self.sink.submit(&target) {
            Ok(()) => {
                self.advance(&mut target, TargetStatus::Exported, None);
            }
            Err(e) => {
                warn!(
                    target_id = %target.id,
                    url = %target.url,
                    error = %e,
                    "export sink failed; target stays generated"
                );
            }
        }

        target
    }

    /// One navigation + extraction attempt against a pooled session.
    async fn extract_once(&self, target: &Target) -> Result<ExtractionRecord, StageError> {
        let mut session = tokio::select! {
            res = self.pool.acquire() => res.map_err(StageError::Browser)?,
            _ = self.cancel.cancelled() => return Err(StageError::Cancelled),
        };

        let raced = {
            let fut = session.navigate(
                &target.url,
                &target.extraction_spec.wait,
                self.config.navigation_timeout,
            );
            tokio::pin!(fut);
            tokio::select! {
                res = &mut fut => Raced::Done(res),
                _ = self.cancel.cancelled() => {
                    match tokio::time::timeout(self.config.cancel_grace, &mut fut).await {
                        Ok(res) => Raced::Done(res),
                        Err(_) => Raced::Abandoned,
                    }
                }
            }
        };

        match raced {
            Raced::Abandoned => {
                // Mid-navigation abandonment leaves the page in an unknown
                // state; the session is not reusable.
                session.discard().await;
                Err(StageError::Cancelled)
            }
            Raced::Done(Err(e)) => {
                if session.is_alive() {
                    session.release().await;
                } else {
                    session.discard().await;
                }
                Err(StageError::Browser(e))
            }
            Raced::Done(Ok(markup)) => {
                session.release().await;
                extract::extract(&target.url, &markup, &target.extraction_spec)
                    .map_err(StageError::Content)
            }
        }
    }

    fn advance(&self, target: &mut Target, next: TargetStatus, detail: Option<String>) {
        let from = target.status;
        if target.transition(next) {
            self.progress.emit(target, from, detail);
        }
    }

    fn fail(&self, target: &mut Target, kind: FailureKind, detail: impl Into<String>) {
        let from = target.status;
        let detail = detail.into();
        target.fail(kind, detail.clone());
        self.progress.emit(target, from, Some(detail));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CsvExporter;
    use crate::extract::{ExtractionSpec, FieldRule};
    use crate::testing::{MockDriver, MockModel, NavFailure, TransientKind};
    use std::time::Duration;

    fn config() -> PipelineConfig {
        PipelineConfig::new("sk-test")
            .with_session_pool_size(1)
            .with_generation_rate_limit(100)
            .with_retry_delays(Duration::from_millis(1), Duration::from_millis(2))
    }

    fn coordinator(
        driver: MockDriver,
        model: MockModel,
        config: PipelineConfig,
    ) -> Arc<Coordinator<MockDriver, MockModel, CsvExporter>> {
        Arc::new(Coordinator::new(driver, model, CsvExporter::new(), config).unwrap())
    }

    #[tokio::test]
    async fn single_target_reaches_exported() {
        let driver = MockDriver::new().with_page(
            "https://a.example",
            "<html><head><title>A</title></head><body><main>Alpha content.</main></body></html>",
        );
        let model = MockModel::new().with_response("summary of alpha");
        let coord = coordinator(driver, model, config());
        let mut events = coord.subscribe().unwrap();

        let run = coord.run(vec![TargetSpec::new("https://a.example")]).await;

        assert_eq!(run.exported_count(), 1);
        let target = &run.targets[0];
        assert_eq!(target.status, TargetStatus::Exported);
        assert_eq!(target.generation.as_ref().unwrap().text, "summary of alpha");

        let mut transitions = Vec::new();
        while let Ok(event) = events.try_recv() {
            transitions.push((event.from, event.to));
        }
        assert_eq!(
            transitions,
            vec![
                (TargetStatus::Queued, TargetStatus::Extracting),
                (TargetStatus::Extracting, TargetStatus::Extracted),
                (TargetStatus::Extracted, TargetStatus::Generating),
                (TargetStatus::Generating, TargetStatus::Generated),
                (TargetStatus::Generated, TargetStatus::Exported),
            ]
        );
    }

    #[tokio::test]
    async fn content_failure_does_not_block_others() {
        // Target #2 carries a required field no page has; #1 and #3 are
        // fine. One session slot forces sequential processing.
        let driver = MockDriver::new();
        let model = MockModel::new();
        let coord = coordinator(driver, model, config());

        let bad_spec = ExtractionSpec::new().with_field(FieldRule::new("sku", "#sku").required());
        let specs = vec![
            TargetSpec::new("https://one.example"),
            TargetSpec::new("https://two.example").with_extraction(bad_spec),
            TargetSpec::new("https://three.example"),
        ];

        let run = coord.run(specs).await;

        assert_eq!(run.exported_count(), 2);
        assert_eq!(run.failed_count(), 1);
        assert_eq!(
            run.failures_by_kind().get(&FailureKind::ExtractionEmpty),
            Some(&1)
        );

        let failed = run
            .targets
            .iter()
            .find(|t| t.url == "https://two.example")
            .unwrap();
        assert_eq!(failed.failure_kind(), Some(FailureKind::ExtractionEmpty));
        // Content errors never consume navigation retries.
        assert_eq!(failed.extraction_attempts, 1);
    }

    #[tokio::test]
    async fn transient_navigation_retried_within_budget() {
        let driver = MockDriver::new()
            .with_nav_failures("https://flaky.example", NavFailure::Timeout, 2)
            .with_page(
                "https://flaky.example",
                "<html><body><main>Recovered.</main></body></html>",
            );
        let counters = driver.counters();
        let model = MockModel::new();
        let coord = coordinator(
            driver,
            model,
            config().with_extraction_retry_limit(3),
        );

        let run = coord.run(vec![TargetSpec::new("https://flaky.example")]).await;

        assert_eq!(run.exported_count(), 1);
        assert_eq!(run.targets[0].extraction_attempts, 3);
        assert_eq!(counters.navigations().len(), 3);
    }

    #[tokio::test]
    async fn navigation_budget_exhaustion_fails_target() {
        let driver =
            MockDriver::new().with_nav_failures("https://down.example", NavFailure::Timeout, 10);
        let model = MockModel::new();
        let coord = coordinator(
            driver,
            model,
            config().with_extraction_retry_limit(2),
        );

        let run = coord.run(vec![TargetSpec::new("https://down.example")]).await;

        let target = &run.targets[0];
        assert_eq!(target.failure_kind(), Some(FailureKind::NavigationTimeout));
        // retry_limit = 2 means exactly 3 attempts.
        assert_eq!(target.extraction_attempts, 3);
        assert!(target.last_error.is_some());
    }

    #[tokio::test]
    async fn session_crash_is_survived_by_replacement() {
        let driver = MockDriver::new()
            .with_nav_failures("https://a.example", NavFailure::Crash, 1)
            .with_page(
                "https://a.example",
                "<html><body><main>Back up.</main></body></html>",
            );
        let counters = driver.counters();
        let model = MockModel::new();
        let coord = coordinator(driver, model, config());

        let run = coord.run(vec![TargetSpec::new("https://a.example")]).await;

        assert_eq!(run.exported_count(), 1);
        // The crashed session was discarded and a fresh one launched.
        assert_eq!(counters.launches(), 2);
    }

    #[tokio::test]
    async fn generation_rejection_fails_without_retries() {
        let driver = MockDriver::new();
        let model = MockModel::new().always_reject("invalid credentials");
        let calls = model.call_count_handle();
        let coord = coordinator(driver, model, config().with_generation_retry_limit(5));

        let run = coord.run(vec![TargetSpec::new("https://a.example")]).await;

        let target = &run.targets[0];
        assert_eq!(target.failure_kind(), Some(FailureKind::GenerationRejected));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generation_exhaustion_records_attempts() {
        let driver = MockDriver::new();
        let model = MockModel::new().always_fail_transient(TransientKind::Timeout);
        let coord = coordinator(driver, model, config().with_generation_retry_limit(2));

        let run = coord.run(vec![TargetSpec::new("https://a.example")]).await;

        let target = &run.targets[0];
        assert_eq!(
            target.failure_kind(),
            Some(FailureKind::GenerationExhausted)
        );
        assert_eq!(target.generation_attempts, 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_fails_queued_targets() {
        let driver = MockDriver::new();
        let model = MockModel::new();
        let coord = coordinator(driver, model, config());

        coord.cancellation_token().cancel();
        let run = coord
            .run(vec![
                TargetSpec::new("https://a.example"),
                TargetSpec::new("https://b.example"),
            ])
            .await;

        assert_eq!(run.failed_count(), 2);
        assert_eq!(
            run.failures_by_kind().get(&FailureKind::Cancelled),
            Some(&2)
        );
    }

    #[tokio::test]
    async fn export_failure_leaves_target_generated() {
        struct FailingSink;
        impl ExportSink for FailingSink {
            fn submit(&self, _target: &Target) -> crate::error::ExportResult<()> {
                Err(crate::error::ExportError::Io(std::io::Error::other(
                    "disk full",
                )))
            }
        }

        let driver = MockDriver::new();
        let model = MockModel::new();
        let coord =
            Arc::new(Coordinator::new(driver, model, FailingSink, config()).unwrap());

        let run = coord.run(vec![TargetSpec::new("https://a.example")]).await;

        let target = &run.targets[0];
        assert_eq!(target.status, TargetStatus::Generated);
        assert_eq!(run.failed_count(), 0);
        assert!(run.is_settled());
    }
}
