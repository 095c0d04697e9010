//! Synthetic table sources.
//!
//! [`TableGenerator`] produces rows lazily from one closure per column.
//! [`FlowLogGenerator`] builds on it to emit random version-2 flow-log records,
//! which is handy for load tests and for exercising the parallel path.

use super::{Row, Rows, TableSource};
use rand::Rng;
use rand::seq::SliceRandom;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Produces the value of one column, once per row.
pub type ColumnFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Lazily generated table. Each call to [`rows`](TableSource::rows) starts a
/// fresh sequence; closures are invoked again for every row.
#[derive(Clone)]
pub struct TableGenerator {
    limit: Option<u64>,
    columns: Arc<[ColumnFn]>,
}

impl TableGenerator {
    /// A generator yielding exactly `rows` rows.
    pub fn new(rows: u64, columns: Vec<ColumnFn>) -> Self {
        Self {
            limit: Some(rows),
            columns: columns.into(),
        }
    }

    /// A generator that never ends. Callers must bound consumption themselves.
    pub fn unbounded(columns: Vec<ColumnFn>) -> Self {
        Self {
            limit: None,
            columns: columns.into(),
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    fn generate(columns: &[ColumnFn]) -> Row {
        columns.iter().map(|column| column()).collect()
    }
}

impl TableSource for TableGenerator {
    fn rows(&self) -> anyhow::Result<Rows> {
        let columns = Arc::clone(&self.columns);
        let rows = std::iter::repeat_with(move || Ok(Self::generate(&columns)));
        Ok(match self.limit {
            Some(limit) => {
                let limit = usize::try_from(limit).unwrap_or(usize::MAX);
                Rows::new(rows.take(limit))
            }
            None => Rows::new(rows),
        })
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TableGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit {
            Some(rows) => write!(f, "generator[rows={rows}, columns={}]", self.columns.len()),
            None => write!(f, "generator[rows=unbounded, columns={}]", self.columns.len()),
        }
    }
}

impl fmt::Debug for TableGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableGenerator")
            .field("limit", &self.limit)
            .field("columns", &self.columns.len())
            .finish()
    }
}

/// Random version-2 flow-log records.
#[derive(Clone, Debug)]
pub struct FlowLogGenerator {
    inner: TableGenerator,
}

impl FlowLogGenerator {
    /// Ports drawn for both source and destination.
    pub const PORTS: [u16; 14] = [
        23, 25, 80, 110, 143, 443, 993, 1024, 1030, 49152, 49153, 49154, 49321, 56000,
    ];
    /// IANA protocol numbers drawn for the protocol column.
    pub const PROTOCOLS: [u8; 10] = [1, 4, 6, 12, 17, 27, 41, 58, 115, 143];
    /// Columns per record.
    pub const COLUMNS: usize = 14;
    /// Rough size of one rendered record, used by [`of_mebibytes`](Self::of_mebibytes).
    pub const APPROX_RECORD_BYTES: u64 = 100;

    pub fn new(rows: u64) -> Self {
        Self {
            inner: TableGenerator::new(rows, Self::columns()),
        }
    }

    /// Enough rows for roughly `mebibytes` MiB of rendered output.
    pub fn of_mebibytes(mebibytes: u64) -> Self {
        Self::new(mebibytes.saturating_mul(1024 * 1024) / Self::APPROX_RECORD_BYTES)
    }

    pub fn limit(&self) -> Option<u64> {
        self.inner.limit()
    }

    fn columns() -> Vec<ColumnFn> {
        vec![
            Arc::new(|| "2".to_string()),
            Arc::new(|| rand::thread_rng().gen_range(0..999_999_999_999u64).to_string()),
            Arc::new(|| format!("eni-{:x}", rand::thread_rng().gen_range(0..i32::MAX))),
            Arc::new(address),
            Arc::new(address),
            Arc::new(|| pick(&Self::PORTS)),
            Arc::new(|| pick(&Self::PORTS)),
            Arc::new(|| pick(&Self::PROTOCOLS)),
            Arc::new(|| rand::thread_rng().gen_range(1..i32::MAX).to_string()),
            Arc::new(|| rand::thread_rng().gen_range(1..i32::MAX).to_string()),
            Arc::new(epoch_seconds),
            Arc::new(epoch_seconds),
            Arc::new(|| {
                let accepted = rand::thread_rng().gen_bool(0.5);
                (if accepted { "ACCEPT" } else { "REJECT" }).to_string()
            }),
            Arc::new(|| "OK".to_string()),
        ]
    }
}

impl TableSource for FlowLogGenerator {
    fn rows(&self) -> anyhow::Result<Rows> {
        self.inner.rows()
    }

    fn describe(&self) -> String {
        format!("flow-log {}", self.inner)
    }
}

fn pick<T: ToString>(values: &[T]) -> String {
    values
        .choose(&mut rand::thread_rng())
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn address() -> String {
    let octets: [u8; 4] = rand::thread_rng().r#gen();
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

fn epoch_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}
