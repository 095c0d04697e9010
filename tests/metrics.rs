//! Tests for the metrics module.

use flowtag::metrics::MetricsCollector;
use flowtag::testing::TempFilePath;
use serde_json::json;

#[test]
fn counters_accumulate_and_reset() {
    let metrics = MetricsCollector::new();
    metrics.increment_counter("rows", 5);
    metrics.increment_counter("rows", 2);
    assert_eq!(metrics.counter("rows"), Some(7));

    metrics.set_counter("rows", 1);
    assert_eq!(metrics.counter("rows"), Some(1));
    assert_eq!(metrics.counter("missing"), None);
}

#[test]
fn clones_share_state() {
    let metrics = MetricsCollector::new();
    let other = metrics.clone();
    other.increment_counter("tags", 3);
    assert_eq!(metrics.counter("tags"), Some(3));
}

#[test]
fn elapsed_requires_start_and_end() {
    let metrics = MetricsCollector::new();
    assert!(metrics.elapsed().is_none());
    metrics.record_start();
    assert!(metrics.elapsed().is_none());
    metrics.record_end();
    assert!(metrics.elapsed().is_some());
}

#[test]
fn json_snapshot() {
    let metrics = MetricsCollector::new();
    metrics.set_counter("combinations", 5);
    assert_eq!(metrics.to_json(), json!({ "combinations": 5 }));

    metrics.record_start();
    metrics.record_end();
    metrics.log();
    assert!(metrics.to_json()["execution_time_ms"].is_u64());
}

#[test]
fn save_to_file() -> anyhow::Result<()> {
    let metrics = MetricsCollector::new();
    metrics.set_counter("rows", 42);
    let file = TempFilePath::with_extension("json")?;
    metrics.save_to_file(file.path())?;

    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(file.path())?)?;
    assert_eq!(saved["rows"], json!(42));
    Ok(())
}
