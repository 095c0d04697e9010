//! Run metrics.
//!
//! A [`MetricsCollector`] records named counters and the wall-clock span of a
//! run. The processor fills it in; callers can log it, read a snapshot, or save
//! it as JSON.
//!
//! ```no_run
//! use flowtag::metrics::MetricsCollector;
//!
//! let metrics = MetricsCollector::new();
//! metrics.record_start();
//! metrics.increment_counter("rows", 5);
//! metrics.record_end();
//! metrics.save_to_file("metrics.json")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::info;

/// Rows seen by the processor (debug mode only).
pub const ROWS: &str = "rows";
/// Distinct tags in the result.
pub const TAGS: &str = "tags";
/// Distinct port/protocol combinations in the result.
pub const COMBINATIONS: &str = "combinations";

/// Thread-safe metrics container; clones share state.
#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsInner>>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    counters: BTreeMap<String, u64>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&self) {
        let mut inner = self.lock();
        inner.start_time = Some(Instant::now());
        inner.end_time = None;
    }

    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Time between [`record_start`](Self::record_start) and
    /// [`record_end`](Self::record_end), if both happened.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to counter `name`, creating it at zero if needed.
    pub fn increment_counter(&self, name: &str, value: u64) {
        *self.lock().counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock().counters.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock().counters.get(name).copied()
    }

    /// All counters plus `execution_time_ms` when the run has finished.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut object = Map::new();
        for (name, value) in &inner.counters {
            object.insert(name.clone(), json!(value));
        }
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            let elapsed_ms = end.duration_since(start).as_millis();
            object.insert("execution_time_ms".to_string(), json!(elapsed_ms));
        }
        Value::Object(object)
    }

    /// Log every metric at `info` level.
    pub fn log(&self) {
        let elapsed = self.elapsed();
        let inner = self.lock();
        if let Some(elapsed) = elapsed {
            info!(seconds = elapsed.as_secs_f64(), "execution time");
        }
        for (name, value) in &inner.counters {
            info!(metric = %name, value, "metric");
        }
    }

    /// Save [`to_json`](Self::to_json) as pretty-printed JSON.
    ///
    /// # Errors
    /// Fails when the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
