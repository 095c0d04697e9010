//! The counting pass over a flow log.
//!
//! Each flow-log row is projected to a [`Protocol`]: its protocol-code column
//! is resolved through the IANA table to a keyword (`"?"` when unknown) and
//! paired with its destination-port column. The protocol is then resolved to a
//! tag ([`UNTAGGED`](crate::lookup::UNTAGGED) when unmapped). Two tallies are
//! kept in the same single pass:
//!
//! - rows per tag
//! - rows per distinct protocol
//!
//! In parallel mode rows are fanned out to Rayon workers in no particular
//! order. Every worker folds into its own [`Counts`] and the partial counts are
//! merged pairwise at the end, so the totals are exact without any shared
//! counter. Reports are sorted afterwards to make the output deterministic.
//!
//! Rows never fail classification: too few columns, a malformed port or an
//! unknown protocol code all land in the unknown/untagged buckets.

use crate::io::TableFileWriter;
use crate::lookup::ReferenceTables;
use crate::metrics::{self, MetricsCollector};
use crate::protocol::Protocol;
use crate::resources::{Release, release_all};
use crate::runner::ExecMode;
use crate::settings::Settings;
use crate::table::{Row, Rows, TableSink, TableSource};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::info;

/// Column of the destination port in a version-2 flow-log record.
pub const DESTINATION_PORT: usize = 6;
/// Column of the IANA protocol number in a version-2 flow-log record.
pub const PROTOCOL: usize = 7;

pub const TAG_COUNTS_TITLE: &str = "Tag Counts:";
pub const COMBINATION_COUNTS_TITLE: &str = "Port/Protocol Combination Counts:";

/// The two frequency maps produced by a run. Keys only appear with a count of
/// at least one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub tags: HashMap<Arc<str>, u64>,
    pub combinations: HashMap<Protocol, u64>,
}

impl Counts {
    fn record(&mut self, tag: &Arc<str>, protocol: Protocol) {
        match self.tags.get_mut(tag) {
            Some(count) => *count += 1,
            None => {
                self.tags.insert(Arc::clone(tag), 1);
            }
        }
        *self.combinations.entry(protocol).or_insert(0) += 1;
    }

    /// Fold `other` into `self`, iterating over whichever side is smaller.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        let (mut big, small) = if self.combinations.len() >= other.combinations.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (tag, n) in small.tags {
            *big.tags.entry(tag).or_insert(0) += n;
        }
        for (protocol, n) in small.combinations {
            *big.combinations.entry(protocol).or_insert(0) += n;
        }
        big
    }

    /// Number of rows counted.
    pub fn total(&self) -> u64 {
        self.tags.values().sum()
    }

    pub fn tag_count(&self, tag: &str) -> u64 {
        self.tags.get(tag).copied().unwrap_or(0)
    }

    pub fn combination_count(&self, port: u16, name: &str) -> u64 {
        self.combinations
            .get(&Protocol::new(port, name))
            .copied()
            .unwrap_or(0)
    }

    /// Tag counts in lexicographic tag order.
    pub fn sorted_tags(&self) -> Vec<(&str, u64)> {
        let mut tags: Vec<_> = self.tags.iter().map(|(t, n)| (&**t, *n)).collect();
        tags.sort_unstable();
        tags
    }

    /// Combination counts in protocol order (port, then name).
    pub fn sorted_combinations(&self) -> Vec<(&Protocol, u64)> {
        let mut combinations: Vec<_> = self.combinations.iter().map(|(p, n)| (p, *n)).collect();
        combinations.sort_unstable();
        combinations
    }

    /// Write both report sections to `sink`, separated by one blank row.
    ///
    /// # Errors
    /// Propagates sink write failures.
    pub fn write_report(&self, sink: &mut dyn TableSink) -> Result<()> {
        sink.write_row(&[TAG_COUNTS_TITLE])?;
        sink.write_row(&["Tag", "Count"])?;
        for (tag, count) in self.sorted_tags() {
            sink.write_row(&[tag, &count.to_string()])?;
        }

        sink.blank()?;

        sink.write_row(&[COMBINATION_COUNTS_TITLE])?;
        sink.write_row(&["Port", "Protocol", "Count"])?;
        for (protocol, count) in self.sorted_combinations() {
            sink.write_row(&[&protocol.port().to_string(), protocol.name(), &count.to_string()])?;
        }
        Ok(())
    }
}

/// Project one flow-log row to its protocol and tag.
pub fn classify<'t>(row: &[String], tables: &'t ReferenceTables) -> (&'t Arc<str>, Protocol) {
    let protocol = match (row.get(DESTINATION_PORT), row.get(PROTOCOL)) {
        (Some(port), Some(code)) => {
            let keyword = tables.iana.resolve(code).shared_name();
            Protocol::with_shared_name(port, keyword).unwrap_or_else(|_| Protocol::unknown().clone())
        }
        _ => Protocol::unknown().clone(),
    };
    (tables.tag(&protocol), protocol)
}

/// Debug instrumentation: counts raw rows and mirrors them to a sink.
pub struct RowMirror {
    sink: Mutex<Box<dyn TableSink>>,
    rows: AtomicU64,
}

impl RowMirror {
    pub fn new(sink: Box<dyn TableSink>) -> Self {
        Self {
            sink: Mutex::new(sink),
            rows: AtomicU64::new(0),
        }
    }

    fn observe(&self, row: &Row) -> Result<()> {
        self.rows.fetch_add(1, Ordering::Relaxed);
        let columns: Vec<&str> = row.iter().map(String::as_str).collect();
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_row(&columns)
    }

    /// Rows observed so far.
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }
}

impl Release for RowMirror {
    fn release(&mut self) -> Result<()> {
        self.sink
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .close()
    }

    fn resource_name(&self) -> String {
        "debug row mirror".to_string()
    }
}

/// Count `rows` in a single pass.
///
/// `mirror`, when given, sees every raw row before it is classified; it does
/// not influence the counts.
///
/// # Errors
/// The first read error from `rows` (or write error from `mirror`) aborts the
/// pass.
pub fn tally(
    mut rows: Rows,
    tables: &ReferenceTables,
    mode: ExecMode,
    mirror: Option<&RowMirror>,
) -> Result<Counts> {
    let step = |mut counts: Counts, row: Result<Row>| -> Result<Counts> {
        let row = row?;
        if let Some(mirror) = mirror {
            mirror.observe(&row)?;
        }
        let (tag, protocol) = classify(&row, tables);
        counts.record(tag, protocol);
        Ok(counts)
    };

    match mode {
        ExecMode::Sequential => rows.try_fold(Counts::default(), step),
        ExecMode::Parallel { .. } => mode.install(|| {
            rows.par_bridge()
                .try_fold(Counts::default, step)
                .try_reduce(Counts::default, |left, right| Ok(left.merge(right)))
        })?,
    }
}

/// Runs the counting pass over a flow log and writes the report.
///
/// The processor owns its output sink (and the debug mirror, if any);
/// [`close`](Self::close) releases both.
pub struct FlowLogProcessor {
    input: Box<dyn TableSource>,
    tables: Arc<ReferenceTables>,
    output: Box<dyn TableSink>,
    mirror: Option<RowMirror>,
    mode: ExecMode,
    metrics: MetricsCollector,
}

impl FlowLogProcessor {
    pub fn new(
        input: Box<dyn TableSource>,
        tables: Arc<ReferenceTables>,
        output: Box<dyn TableSink>,
    ) -> Self {
        Self {
            input,
            tables,
            output,
            mirror: None,
            mode: ExecMode::default(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Build a processor configured by `settings`. In debug mode raw rows are
    /// mirrored to `settings.debug_path`.
    ///
    /// # Errors
    /// Fails when the debug file cannot be created.
    pub fn from_settings(
        input: Box<dyn TableSource>,
        tables: Arc<ReferenceTables>,
        output: Box<dyn TableSink>,
        settings: &Settings,
    ) -> Result<Self> {
        let mut processor = Self::new(input, tables, output).with_mode(settings.mode);
        if settings.debug {
            let writer = TableFileWriter::create(&settings.debug_path)
                .with_context(|| format!("create debug file {}", settings.debug_path.display()))?;
            processor = processor.with_mirror(Box::new(writer));
        }
        Ok(processor)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable debug mirroring of raw input rows into `sink`.
    #[must_use]
    pub fn with_mirror(mut self, sink: Box<dyn TableSink>) -> Self {
        self.mirror = Some(RowMirror::new(sink));
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// Count the input, write the report to the output sink and flush it.
    ///
    /// # Errors
    /// Fails on any read error from the input or write error on the output;
    /// rows already flushed to the output are left intact.
    pub fn run(&mut self) -> Result<Counts> {
        let started = Instant::now();
        self.metrics.record_start();
        info!(input = %self.input.describe(), mode = ?self.mode, "processing");

        let rows = self
            .input
            .rows()
            .with_context(|| format!("open input {}", self.input.describe()))?;
        let counts = tally(rows, &self.tables, self.mode, self.mirror.as_ref())
            .with_context(|| format!("count rows of {}", self.input.describe()))?;

        counts.write_report(self.output.as_mut())?;
        self.output.flush()?;

        self.metrics.record_end();
        self.metrics.set_counter(metrics::TAGS, counts.tags.len() as u64);
        self.metrics
            .set_counter(metrics::COMBINATIONS, counts.combinations.len() as u64);
        let seconds = started.elapsed().as_secs_f64();
        match &self.mirror {
            Some(mirror) => {
                self.metrics.set_counter(metrics::ROWS, mirror.rows());
                info!(rows = mirror.rows(), seconds, "processed");
            }
            None => info!(seconds, "processed"),
        }
        Ok(counts)
    }

    /// Release the output sink and the debug mirror. Failures are logged, never
    /// returned; every resource gets a release attempt.
    pub fn close(&mut self) {
        match self.mirror.as_mut() {
            Some(mirror) => release_all(&mut [&mut self.output, mirror]),
            None => release_all(&mut [&mut self.output]),
        };
    }
}
