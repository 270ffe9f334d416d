//! Integration tests for the full scrape-generate pipeline.
//!
//! These tests drive the coordinator end to end with scripted mocks:
//! 1. Navigate targets through a bounded session pool
//! 2. Extract structured records
//! 3. Generate derived text under rate limiting and retry budgets
//! 4. Export tabular and document artifacts

use std::sync::Arc;
use std::time::{Duration, Instant};

use content_pipeline::{
    document, testing::{MockDriver, MockModel, TransientKind},
    Coordinator, CsvExporter, ExtractionSpec, FailureKind, FieldRule, PipelineConfig, TargetSpec,
    TargetStatus,
};

fn base_config() -> PipelineConfig {
    PipelineConfig::new("sk-test")
        .with_session_pool_size(1)
        .with_generation_rate_limit(100)
        .with_retry_delays(Duration::from_millis(1), Duration::from_millis(2))
}

fn page(body: &str) -> String {
    format!("<html><head><title>Page</title></head><body><main>{body}</main></body></html>")
}

#[tokio::test]
async fn one_slot_three_targets_isolated_failure() {
    // Target #2 always fails with a content error; #1 and #3 must be
    // unaffected even though all three share one session slot.
    let driver = MockDriver::new()
        .with_page("https://one.example", page("First page."))
        .with_page("https://two.example", page("Second page."))
        .with_page("https://three.example", page("Third page."));
    let model = MockModel::new().with_response("derived");

    let coordinator = Arc::new(
        Coordinator::new(driver, model, CsvExporter::new(), base_config()).unwrap(),
    );

    let broken = ExtractionSpec::new().with_field(FieldRule::new("sku", "#sku").required());
    let run = coordinator
        .run(vec![
            TargetSpec::new("https://one.example"),
            TargetSpec::new("https://two.example").with_extraction(broken),
            TargetSpec::new("https://three.example"),
        ])
        .await;

    assert_eq!(run.exported_count(), 2);
    assert_eq!(run.failed_count(), 1);
    assert_eq!(
        run.failures_by_kind().get(&FailureKind::ExtractionEmpty),
        Some(&1)
    );

    for url in ["https://one.example", "https://three.example"] {
        let target = run.targets.iter().find(|t| t.url == url).unwrap();
        assert_eq!(target.status, TargetStatus::Exported, "{url} affected");
    }
}

#[tokio::test]
async fn generation_retry_budget_is_exact() {
    // retry_limit = 2 with an always-timing-out model: exactly 3 calls,
    // then Failed(GenerationExhausted).
    let driver = MockDriver::new().with_page("https://a.example", page("Body."));
    let model = MockModel::new().always_fail_transient(TransientKind::Timeout);
    let calls = model.call_count_handle();

    let coordinator = Arc::new(
        Coordinator::new(
            driver,
            model,
            CsvExporter::new(),
            base_config().with_generation_retry_limit(2),
        )
        .unwrap(),
    );

    let run = coordinator.run(vec![TargetSpec::new("https://a.example")]).await;

    let target = &run.targets[0];
    assert_eq!(
        target.failure_kind(),
        Some(FailureKind::GenerationExhausted)
    );
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(target.generation_attempts, 3);
}

#[tokio::test]
async fn truncation_marks_result_and_caps_prompt() {
    let long_body = "word ".repeat(5_000);
    let driver = MockDriver::new().with_page("https://long.example", page(&long_body));
    let model = MockModel::new().with_response("short summary");

    let budget = 1_000;
    let coordinator = Arc::new(
        Coordinator::new(
            driver,
            model,
            CsvExporter::new(),
            base_config().with_context_truncation_budget(budget),
        )
        .unwrap(),
    );

    let run = coordinator
        .run(vec![TargetSpec::new("https://long.example")])
        .await;

    let target = &run.targets[0];
    assert_eq!(target.status, TargetStatus::Exported);
    assert!(target.generation.as_ref().unwrap().truncated);
}

#[tokio::test]
async fn rate_limit_holds_under_concurrent_workers() {
    // Four workers race for completion slots; a 2/sec quota means six
    // generations cannot finish faster than the bucket refills.
    let driver = MockDriver::new();
    let model = MockModel::new().with_response("ok");

    let coordinator = Arc::new(
        Coordinator::new(
            driver,
            model,
            CsvExporter::new(),
            base_config()
                .with_session_pool_size(4)
                .with_generation_rate_limit(2),
        )
        .unwrap(),
    );

    let specs: Vec<TargetSpec> = (0..6)
        .map(|i| TargetSpec::new(format!("https://t{i}.example")))
        .collect();

    let start = Instant::now();
    let run = coordinator.run(specs).await;
    let elapsed = start.elapsed();

    assert_eq!(run.exported_count(), 6);
    // 6 requests at 2/sec: at least ~2s of pacing beyond the initial burst.
    assert!(
        elapsed.as_millis() >= 1_500,
        "aggregate rate not enforced: {elapsed:?}"
    );
}

#[tokio::test]
async fn double_export_adds_no_rows() {
    let driver = MockDriver::new()
        .with_page("https://a.example", page("Alpha."))
        .with_page("https://b.example", page("Beta."));
    let model = MockModel::new().with_response("derived");

    let coordinator = Arc::new(
        Coordinator::new(driver, model, CsvExporter::new(), base_config()).unwrap(),
    );

    let run = coordinator
        .run(vec![
            TargetSpec::new("https://a.example"),
            TargetSpec::new("https://b.example"),
        ])
        .await;

    let first = coordinator.sink().export(&run).unwrap();
    let second = coordinator.sink().export(&run).unwrap();

    assert_eq!(first.rows, 2);
    assert_eq!(second.rows, 2);
    assert_eq!(first.csv, second.csv);
}

#[tokio::test]
async fn document_artifact_renders_for_exported_target() {
    let driver = MockDriver::new().with_page(
        "https://acme.example",
        "<html><head><title>Acme Corp</title></head><body>\
         <main><p>We make everything.</p></main>\
         <span id=\"phone\">555-0100</span></body></html>",
    );
    let model = MockModel::new().with_response("Acme makes everything.");

    let coordinator = Arc::new(
        Coordinator::new(driver, model, CsvExporter::new(), base_config()).unwrap(),
    );

    let spec = ExtractionSpec::new().with_field(FieldRule::new("phone", "#phone"));
    let run = coordinator
        .run(vec![TargetSpec::new("https://acme.example").with_extraction(spec)])
        .await;

    let doc = document(&run.targets[0]).unwrap();
    assert_eq!(doc.filename, "acme_corp.md");
    assert!(doc.content.contains("- phone: 555-0100"));
    assert!(doc.content.contains("Acme makes everything."));
}

#[tokio::test]
async fn cancellation_stops_new_stage_entries() {
    // Slow navigations hold the single worker; cancelling mid-run must
    // fail the queued targets without letting them start.
    let driver = MockDriver::new().with_nav_delay(Duration::from_millis(200));
    let counters = driver.counters();
    let model = MockModel::new();

    let coordinator = Arc::new(
        Coordinator::new(
            driver,
            model,
            CsvExporter::new(),
            base_config().with_cancel_grace(Duration::from_secs(1)),
        )
        .unwrap(),
    );

    let specs: Vec<TargetSpec> = (0..5)
        .map(|i| TargetSpec::new(format!("https://t{i}.example")))
        .collect();

    let token = coordinator.cancellation_token();
    let runner = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run(specs).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    let run = runner.await.unwrap();

    // The in-flight navigation finished inside the grace period; targets
    // never started end Failed(Cancelled).
    let cancelled = run
        .failures_by_kind()
        .get(&FailureKind::Cancelled)
        .copied()
        .unwrap_or(0);
    assert!(cancelled >= 3, "expected queued targets cancelled, got {cancelled}");
    assert!(
        counters.navigations().len() <= 2,
        "no new navigations may start after cancel"
    );
    assert!(run.is_settled());
}

#[tokio::test]
async fn progress_feed_reports_every_transition() {
    let driver = MockDriver::new().with_page("https://a.example", page("Alpha."));
    let model = MockModel::new();

    let coordinator = Arc::new(
        Coordinator::new(driver, model, CsvExporter::new(), base_config()).unwrap(),
    );
    let mut events = coordinator.subscribe().unwrap();

    let run = coordinator.run(vec![TargetSpec::new("https://a.example")]).await;
    assert_eq!(run.exported_count(), 1);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.url, "https://a.example");
        seen.push(event.to);
    }
    assert_eq!(
        seen,
        vec![
            TargetStatus::Extracting,
            TargetStatus::Extracted,
            TargetStatus::Generating,
            TargetStatus::Generated,
            TargetStatus::Exported,
        ]
    );
}
