//! Row sources and row sinks.
//!
//! A table is modelled as a flat sequence of [`Row`]s, each an ordered list of
//! string columns whose meaning is fixed by the caller's schema. Two traits
//! describe the two directions data moves in:
//!
//! - [`TableSource`] produces rows. Every call to [`TableSource::rows`] yields
//!   a fresh, independent [`Rows`] iterator; nothing is shared between calls.
//! - [`TableSink`] consumes rows with append semantics and exposes explicit
//!   `flush`/`close`.
//!
//! Concrete variants:
//!
//! | Type | Direction | Backing |
//! |---|---|---|
//! | [`crate::io::TableFileReader`] | source | delimited text file |
//! | [`generator::TableGenerator`] | source | per-column closures |
//! | [`MemoryTable`] | source | in-memory fixture |
//! | [`EmptyTable`] | source | nothing (placeholder) |
//! | [`crate::io::TableFileWriter`] | sink | delimited text file |
//! | [`MemorySink`] | sink | shared in-memory buffer |
//! | [`NoopSink`] | sink | discards everything |
//!
//! # Resource scoping
//! A [`Rows`] iterator owns whatever backs it. Dropping it (at the end of the
//! consuming scope, or through [`Rows::close`]) releases that resource, and
//! file-backed iterators also release their handle as soon as the last row has
//! been produced.

pub mod generator;

use crate::resources::Release;
use anyhow::Result;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// One line of tabular input, split into columns.
pub type Row = Vec<String>;

/// Build a [`Row`] from string slices.
pub fn row<S: AsRef<str>>(columns: &[S]) -> Row {
    columns.iter().map(|c| c.as_ref().to_string()).collect()
}

/// A single pass over a table.
///
/// Items are `Result`s because file-backed sources can fail mid-stream; such an
/// error ends the sequence.
pub struct Rows {
    inner: Box<dyn Iterator<Item = Result<Row>> + Send>,
}

impl Rows {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<Row>> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Release the backing resource without draining the remaining rows.
    pub fn close(self) {
        drop(self);
    }
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows").finish_non_exhaustive()
    }
}

/// Anything that can produce a fresh sequence of rows on demand.
pub trait TableSource: Send + Sync {
    /// Start a new, independent pass over the table.
    ///
    /// # Errors
    /// Sources that cannot be read fail here rather than yielding an empty
    /// sequence.
    fn rows(&self) -> Result<Rows>;

    /// Short human-readable description used in log lines.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<T: TableSource + ?Sized> TableSource for Arc<T> {
    fn rows(&self) -> Result<Rows> {
        (**self).rows()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: TableSource + ?Sized> TableSource for Box<T> {
    fn rows(&self) -> Result<Rows> {
        (**self).rows()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A source with no rows; the default placeholder.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyTable;

impl TableSource for EmptyTable {
    fn rows(&self) -> Result<Rows> {
        Ok(Rows::empty())
    }

    fn describe(&self) -> String {
        "empty table".to_string()
    }
}

/// In-memory fixture. Cloning the table or calling `rows` never copies the
/// backing vector.
#[derive(Clone, Debug, Default)]
pub struct MemoryTable {
    rows: Arc<[Row]>,
}

impl MemoryTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    /// Build a fixture by splitting each line on `separator`.
    pub fn from_lines<S: AsRef<str>>(lines: &[S], separator: &str) -> Self {
        Self::new(
            lines
                .iter()
                .map(|line| line.as_ref().split(separator).map(str::to_string).collect())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TableSource for MemoryTable {
    fn rows(&self) -> Result<Rows> {
        let rows = Arc::clone(&self.rows);
        Ok(Rows::new((0..rows.len()).map(move |i| Ok(rows[i].clone()))))
    }

    fn describe(&self) -> String {
        format!("in-memory table ({} rows)", self.rows.len())
    }
}

/// Consumer side of a table.
pub trait TableSink: Send {
    /// Append one row.
    ///
    /// # Errors
    /// Implementations backed by I/O report write failures here.
    fn write_row(&mut self, columns: &[&str]) -> Result<()>;

    /// Push buffered rows to the backing store.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flush (best effort) and release the backing store. Further writes fail.
    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    /// Append an empty row.
    fn blank(&mut self) -> Result<()> {
        self.write_row(&[])
    }

    /// Append every row of `rows`, in order.
    fn accept(&mut self, rows: &mut dyn Iterator<Item = Row>) -> Result<()> {
        for row in rows {
            let columns: Vec<&str> = row.iter().map(String::as_str).collect();
            self.write_row(&columns)?;
        }
        Ok(())
    }
}

impl<S: TableSink + ?Sized> Release for Box<S> {
    fn release(&mut self) -> Result<()> {
        self.close()
    }
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TableSink for NoopSink {
    fn write_row(&mut self, _columns: &[&str]) -> Result<()> {
        Ok(())
    }
}

impl Release for NoopSink {
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that collects rows in memory.
///
/// Clones share the same buffer, so a test can hand one clone to a processor
/// and inspect the other afterwards.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    rows: Vec<Row>,
    flushes: usize,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row written so far.
    pub fn rows(&self) -> Vec<Row> {
        self.lock().rows.clone()
    }

    /// Rows joined with `separator`, one string per row.
    pub fn lines(&self, separator: &str) -> Vec<String> {
        self.lock().rows.iter().map(|r| r.join(separator)).collect()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TableSink for MemorySink {
    fn write_row(&mut self, columns: &[&str]) -> Result<()> {
        let mut state = self.lock();
        anyhow::ensure!(!state.closed, "write to closed in-memory sink");
        state.rows.push(row(columns));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.lock().closed = true;
        Ok(())
    }
}

impl Release for MemorySink {
    fn release(&mut self) -> Result<()> {
        self.close()
    }
}
