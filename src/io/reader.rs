//! Streaming row source over a delimited text file.
//!
//! [`TableFileReader`] resolves its separator and header flag once, at
//! construction, and checks that the file can be opened so a bad path fails
//! immediately. Each call to [`TableSource::rows`] then opens the file again
//! and returns a [`TableRows`] iterator that:
//!
//! - reads one line ahead of the consumer, never the whole file,
//! - skips empty lines and, when configured, exactly one leading header line,
//! - closes the file as soon as the last row has been handed out, or when it
//!   is dropped or [`TableRows::close`]d, whichever comes first.

use crate::io::compression::auto_detect_reader;
use crate::io::infer::{self, DEFAULT_HEADER_RATIO};
use crate::resources::Release;
use crate::table::{Row, Rows, TableSource};
use anyhow::{Context, Result, anyhow, ensure};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Explicit overrides for [`TableFileReader::with_options`].
///
/// `None` fields are inferred from the file.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    pub separator: Option<String>,
    pub has_header: Option<bool>,
    /// Letters-per-digit ratio for header inference.
    pub header_ratio: u32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            separator: None,
            has_header: None,
            header_ratio: DEFAULT_HEADER_RATIO,
        }
    }
}

impl ReadOptions {
    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    #[must_use]
    pub fn has_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    #[must_use]
    pub fn header_ratio(mut self, ratio: u32) -> Self {
        self.header_ratio = ratio;
        self
    }
}

/// Row source over a delimited text file, optionally compressed.
#[derive(Clone, Debug)]
pub struct TableFileReader {
    path: PathBuf,
    separator: String,
    has_header: bool,
}

impl TableFileReader {
    /// Open `path`, inferring both the separator and the header flag.
    ///
    /// # Errors
    /// Fails when `path` cannot be opened for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, ReadOptions::default())
    }

    /// Open `path` with explicit overrides.
    ///
    /// # Errors
    /// Fails when `path` cannot be opened for reading or the separator is empty.
    pub fn with_options(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        File::open(&path).with_context(|| format!("open {} for reading", path.display()))?;

        let separator = match options.separator {
            Some(separator) => separator,
            None => infer::infer_separator(&path),
        };
        ensure!(!separator.is_empty(), "empty separator for {}", path.display());

        let has_header = options
            .has_header
            .unwrap_or_else(|| infer::infer_header(&path, options.header_ratio));

        debug!(path = %path.display(), separator = ?separator, has_header, "configured table reader");
        Ok(Self {
            path,
            separator,
            has_header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// Start a pass over the file, returning the concrete iterator.
    ///
    /// # Errors
    /// Fails when the file can no longer be opened.
    pub fn open_rows(&self) -> Result<TableRows> {
        let file = File::open(&self.path)
            .with_context(|| format!("open {} for reading", self.path.display()))?;
        let reader = auto_detect_reader(file, &self.path)
            .with_context(|| format!("setup decompression for {}", self.path.display()))?;
        info!(path = %self.path.display(), "reading table");

        let mut rows = TableRows {
            path: self.path.clone(),
            separator: self.separator.clone(),
            reader: Some(Box::new(BufReader::new(reader))),
            skip_header: self.has_header,
            line_number: 0,
            buffer: String::new(),
            pending: None,
        };
        rows.pending = rows.advance();
        Ok(rows)
    }
}

impl TableSource for TableFileReader {
    fn rows(&self) -> Result<Rows> {
        Ok(Rows::new(self.open_rows()?))
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TableFileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (separator {:?}, header: {})",
            self.path.display(),
            self.separator,
            self.has_header
        )
    }
}

/// One pass over a [`TableFileReader`]'s file.
pub struct TableRows {
    path: PathBuf,
    separator: String,
    reader: Option<Box<dyn BufRead + Send>>,
    skip_header: bool,
    line_number: u64,
    buffer: String,
    pending: Option<Result<Row>>,
}

impl TableRows {
    /// `true` while the underlying file handle is held.
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Release the file handle now; remaining rows are discarded.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(path = %self.path.display(), line = self.line_number, "closed table");
        }
        self.pending = None;
    }

    /// Read the next data row, closing the file on EOF or error.
    fn advance(&mut self) -> Option<Result<Row>> {
        loop {
            let reader = self.reader.as_mut()?;
            self.buffer.clear();
            match reader.read_line(&mut self.buffer) {
                Ok(0) => {
                    self.close();
                    return None;
                }
                Ok(_) => {
                    self.line_number += 1;
                    let line = infer::trim_line_end(&self.buffer);
                    if line.is_empty() {
                        continue;
                    }
                    if self.skip_header {
                        self.skip_header = false;
                        continue;
                    }
                    return Some(Ok(line.split(self.separator.as_str()).map(str::to_string).collect()));
                }
                Err(error) => {
                    let error = anyhow!(error).context(format!(
                        "read line {} in {}",
                        self.line_number + 1,
                        self.path.display()
                    ));
                    self.close();
                    return Some(Err(error));
                }
            }
        }
    }
}

impl Iterator for TableRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.pending.take()?;
        if current.is_ok() {
            self.pending = self.advance();
        }
        Some(current)
    }
}

impl Drop for TableRows {
    fn drop(&mut self) {
        self.close();
    }
}

impl Release for TableRows {
    fn release(&mut self) -> Result<()> {
        self.close();
        Ok(())
    }

    fn resource_name(&self) -> String {
        format!("rows of {}", self.path.display())
    }
}

impl fmt::Debug for TableRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRows")
            .field("path", &self.path)
            .field("separator", &self.separator)
            .field("open", &self.is_open())
            .field("line_number", &self.line_number)
            .finish_non_exhaustive()
    }
}
