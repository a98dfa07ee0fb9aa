//! End-to-end tests of the recorder -> aggregator -> NDJSON pipeline.

use std::path::Path;

use stress_domain::events::MetaEvent;
use stress_domain::ErrorCategory;
use stress_driver::aggregator::AggregatorHandle;
use stress_driver::ndjson;
use stress_driver::recorder::Recorder;

fn test_meta() -> MetaEvent {
    MetaEvent {
        run_id: "test-run".into(),
        started_at: "2025-06-01T00:00:00Z".into(),
        transport: "stdio".into(),
        target: "fake-server".into(),
        profile: "baseline".into(),
        shape: "constant".into(),
        duration_secs: 10,
        requests: None,
        concurrency: 4,
        timeout_ms: 30_000,
        seed: 42,
        command: "mcp-stress run --profile baseline -- fake-server".into(),
        aggregate: None,
        run_count: None,
    }
}

fn line_types(path: &Path) -> Vec<Option<String>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value
                .get("type")
                .and_then(|t| t.as_str())
                .map(str::to_string)
        })
        .collect()
}

#[tokio::test]
async fn round_trip_reproduces_latency_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ndjson");

    let aggregator = AggregatorHandle::spawn(test_meta(), Some(path.clone())).unwrap();
    let recorder = Recorder::new(aggregator.inbox());
    let ping = recorder.register_method("ping");
    for i in 1..=100u32 {
        recorder.success(ping, i as f64);
    }
    recorder.flush();
    let artifacts = aggregator.complete(Vec::new(), None).await.unwrap();

    let summary = &artifacts.summary;
    assert_eq!(summary.total_requests, 100);
    assert_eq!(summary.total_errors, 0);
    assert!(summary.overall.p99 > 99.0 && summary.overall.p99 <= 100.0);

    // Re-reading the file yields the same derived statistics.
    let file = ndjson::read_file(&path).unwrap();
    assert_eq!(file.events.len(), 100);
    let latencies: Vec<f64> = file.events.iter().map(|e| e.latency_ms).collect();
    let derived = stress_stats::latency_stats(&latencies);
    assert_eq!(derived, summary.overall);
    assert_eq!(file.summary.unwrap().overall, summary.overall);
}

#[tokio::test]
async fn file_ordering_meta_first_summary_last() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ndjson");

    let aggregator = AggregatorHandle::spawn(test_meta(), Some(path.clone())).unwrap();
    let recorder = Recorder::new(aggregator.inbox());
    let ping = recorder.register_method("ping");
    for _ in 0..10 {
        recorder.success(ping, 2.0);
    }
    recorder.flush();
    aggregator.complete(Vec::new(), None).await.unwrap();

    let types = line_types(&path);
    assert_eq!(types.first().unwrap().as_deref(), Some("meta"));
    assert_eq!(types.last().unwrap().as_deref(), Some("summary"));
    assert!(types[1..types.len() - 1].iter().all(|t| t.is_none()));

    // Timestamps from one recording thread are non-decreasing.
    let file = ndjson::read_file(&path).unwrap();
    assert!(file.events.windows(2).all(|w| w[0].t <= w[1].t));
}

#[tokio::test]
async fn record_conservation_across_methods() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ndjson");

    let aggregator = AggregatorHandle::spawn(test_meta(), Some(path.clone())).unwrap();
    let recorder = Recorder::new(aggregator.inbox());
    let ping = recorder.register_method("ping");
    let tool = recorder.register_method("tools/call:search");

    for _ in 0..30 {
        recorder.success(ping, 1.5);
    }
    for _ in 0..10 {
        recorder.failure(tool, 5.0, ErrorCategory::Server, -32603, "internal");
    }
    for _ in 0..5 {
        recorder.failure(ping, 30_000.0, ErrorCategory::Timeout, -1, "timed out");
    }
    recorder.flush();
    let artifacts = aggregator.complete(Vec::new(), None).await.unwrap();
    let summary = &artifacts.summary;

    assert_eq!(summary.total_requests, 45);
    assert_eq!(summary.total_errors, 15);
    assert_eq!(
        summary.by_method.iter().map(|m| m.count).sum::<u64>(),
        summary.total_requests
    );
    assert_eq!(
        summary.by_method.iter().map(|m| m.errors).sum::<u64>(),
        summary.total_errors
    );
    assert_eq!(summary.error_categories.get("server"), Some(&10));
    assert_eq!(summary.error_categories.get("timeout"), Some(&5));

    let file = ndjson::read_file(&path).unwrap();
    assert_eq!(file.events.len() as u64, summary.total_requests);
    assert_eq!(
        file.events.iter().filter(|e| !e.ok).count() as u64,
        summary.total_errors
    );
}

#[tokio::test]
async fn error_messages_resolve_into_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ndjson");

    let aggregator = AggregatorHandle::spawn(test_meta(), Some(path.clone())).unwrap();
    let recorder = Recorder::new(aggregator.inbox());
    let ping = recorder.register_method("ping");
    recorder.publish_concurrency(8);
    recorder.failure(ping, 4.0, ErrorCategory::Server, -32603, "internal glitch");
    recorder.flush();
    aggregator.complete(Vec::new(), None).await.unwrap();

    let file = ndjson::read_file(&path).unwrap();
    let event = &file.events[0];
    assert!(!event.ok);
    assert_eq!(event.error.as_deref(), Some("internal glitch"));
    assert_eq!(event.error_category, Some(ErrorCategory::Server));
    assert_eq!(event.error_code, Some(-32603));
    assert_eq!(event.concurrency, Some(8));
    assert_eq!(event.phase, None);
}

#[tokio::test]
async fn abandoned_run_has_meta_but_no_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ndjson");

    let aggregator = AggregatorHandle::spawn(test_meta(), Some(path.clone())).unwrap();
    aggregator.abandon().await;

    let file = ndjson::read_file(&path).unwrap();
    assert!(file.meta.is_some());
    assert!(file.events.is_empty());
    assert!(file.summary.is_none());
}

#[tokio::test]
async fn empty_run_still_writes_zeroed_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ndjson");

    let aggregator = AggregatorHandle::spawn(test_meta(), Some(path.clone())).unwrap();
    let artifacts = aggregator.complete(Vec::new(), None).await.unwrap();
    assert_eq!(artifacts.summary.total_requests, 0);
    assert_eq!(artifacts.summary.requests_per_second, 0.0);

    let file = ndjson::read_file(&path).unwrap();
    let summary = file.summary.unwrap();
    assert_eq!(summary.total_requests, 0);
    assert_eq!(summary.duration_ms, 0);
}

#[tokio::test]
async fn rps_uses_last_record_t() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.ndjson");

    let aggregator = AggregatorHandle::spawn(test_meta(), Some(path.clone())).unwrap();
    let recorder = Recorder::new(aggregator.inbox());
    let ping = recorder.register_method("ping");
    for _ in 0..50 {
        recorder.success(ping, 1.0);
    }
    recorder.flush();
    let artifacts = aggregator.complete(Vec::new(), None).await.unwrap();

    let summary = &artifacts.summary;
    if summary.duration_ms > 0 {
        let expected = summary.total_requests as f64 / summary.duration_ms as f64 * 1_000.0;
        assert!((summary.requests_per_second - expected).abs() < 1e-9);
    } else {
        assert_eq!(summary.requests_per_second, 0.0);
    }
}
