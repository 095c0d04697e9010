//! Line-oriented row sink over a delimited text file.

use crate::io::compression::{DynWrite, auto_detect_writer};
use crate::io::infer;
use crate::resources::Release;
use crate::table::TableSink;
use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Row sink that joins columns with a separator and terminates each row with
/// `\n`.
///
/// The file is opened once, at construction; rows from repeated
/// [`TableSink::write_row`] / [`TableSink::accept`] calls are appended to the
/// same handle. [`TableSink::close`] flushes before releasing the handle, and
/// dropping an unclosed writer flushes on a best-effort basis.
pub struct TableFileWriter {
    path: PathBuf,
    separator: String,
    writer: Option<DynWrite>,
    rows_written: u64,
}

impl TableFileWriter {
    /// Create or truncate `path`, inferring the separator from its extension.
    ///
    /// # Errors
    /// Fails when the file (or a missing parent directory) cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let separator = infer::infer_separator(path.as_ref());
        Self::open(path, separator, false)
    }

    /// Open `path` for appending, creating it if needed.
    ///
    /// The separator is inferred before opening, so an existing file's first
    /// line is taken into account.
    ///
    /// # Errors
    /// Fails when the file cannot be opened for writing.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let separator = infer::infer_separator(path.as_ref());
        Self::open(path, separator, true)
    }

    /// Create or truncate `path` with an explicit separator.
    ///
    /// # Errors
    /// Fails when the file cannot be created.
    pub fn with_separator(path: impl AsRef<Path>, separator: impl Into<String>) -> Result<Self> {
        Self::open(path, separator.into(), false)
    }

    fn open(path: impl AsRef<Path>, separator: String, append: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .with_context(|| format!("open {} for writing", path.display()))?;
        let writer = auto_detect_writer(file, &path)
            .with_context(|| format!("setup compression for {}", path.display()))?;

        Ok(Self {
            path,
            separator,
            writer: Some(writer),
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl TableSink for TableFileWriter {
    fn write_row(&mut self, columns: &[&str]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("write to closed file {}", self.path.display()))?;

        // One write per row so the terminator always follows its row.
        let mut line = columns.join(&self.separator);
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .with_context(|| format!("write row {:?} to {}", columns, self.path.display()))?;
        self.rows_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .with_context(|| format!("flush {}", self.path.display()))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        // The handle is released when `writer` drops, even if the flush fails.
        let flushed = writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()));
        drop(writer);
        info!(path = %self.path.display(), rows = self.rows_written, "wrote table");
        flushed
    }
}

impl Release for TableFileWriter {
    fn release(&mut self) -> Result<()> {
        self.close()
    }

    fn resource_name(&self) -> String {
        format!("writer for {}", self.path.display())
    }
}

impl Drop for TableFileWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl fmt::Debug for TableFileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableFileWriter")
            .field("path", &self.path)
            .field("separator", &self.separator)
            .field("open", &self.is_open())
            .field("rows_written", &self.rows_written)
            .finish()
    }
}
