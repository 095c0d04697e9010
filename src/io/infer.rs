//! Separator and header-row inference.
//!
//! Both heuristics look at no more than the first non-empty line of a file, so
//! they stay cheap on very large inputs. They never fail: when the file cannot
//! be read the caller gets the default answer instead of an error.
//!
//! # Separator
//! 1. The (lowercased) file extension is looked up in [`SEPARATORS`]. A
//!    compression suffix is ignored, so `flow.tsv.gz` resolves as `tsv`.
//! 2. Otherwise the most frequent non-alphanumeric character of the first line
//!    wins. Ties go to the character that appears first in the line.
//! 3. Otherwise [`DEFAULT_SEPARATOR`] (a single space).
//!
//! # Header row
//! The first line is treated as a header when it contains letters and at least
//! `ratio` times as many letters as digits ([`DEFAULT_HEADER_RATIO`] is 5).
//! This is a best-effort heuristic, not a content-aware header detector.

use crate::io::compression::{auto_detect_reader, strip_compression_extension};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Separator used when neither the extension nor the content gives an answer.
pub const DEFAULT_SEPARATOR: &str = " ";

/// Letters-per-digit ratio at or above which a first line counts as a header.
pub const DEFAULT_HEADER_RATIO: u32 = 5;

/// Known file extensions and their column separators. Extensions that say
/// nothing about the layout (`txt`, `log`) are left to content inference.
pub const SEPARATORS: &[(&str, &str)] = &[
    ("csv", ","),
    ("tsv", "\t"),
    ("tab", "\t"),
    ("psv", "|"),
    ("ssv", " "),
];

/// Separator registered for `path`'s extension, if any.
pub fn separator_for_extension(path: impl AsRef<Path>) -> Option<&'static str> {
    let stripped = strip_compression_extension(path);
    let extension = stripped.extension()?.to_string_lossy().to_lowercase();
    SEPARATORS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, separator)| *separator)
}

/// Most frequent non-alphanumeric character in `line`; ties go to the one seen
/// first.
pub fn separator_from_line(line: &str) -> Option<String> {
    // Few distinct candidates per line, so a first-seen-ordered vector beats a map.
    let mut counts: Vec<(char, usize)> = Vec::new();
    for c in line.chars().filter(|c| !c.is_alphanumeric()) {
        match counts.iter_mut().find(|(seen, _)| *seen == c) {
            Some((_, n)) => *n += 1,
            None => counts.push((c, 1)),
        }
    }

    let mut best: Option<(char, usize)> = None;
    for (c, n) in counts {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((c, n));
        }
    }
    best.map(|(c, _)| c.to_string())
}

/// Header test for a single line; see the module docs.
pub fn is_header_line(line: &str, ratio: u32) -> bool {
    let (letters, digits) = line.chars().fold((0u64, 0u64), |(l, d), c| {
        if c.is_alphabetic() {
            (l + 1, d)
        } else if c.is_numeric() {
            (l, d + 1)
        } else {
            (l, d)
        }
    });
    letters > 0 && letters >= u64::from(ratio) * digits
}

/// Infer the column separator of `path`. Never fails.
pub fn infer_separator(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    if let Some(separator) = separator_for_extension(path) {
        debug!(path = %path.display(), separator = ?separator, "separator from extension");
        return separator.to_string();
    }

    match first_line(path) {
        Ok(Some(line)) => {
            if let Some(separator) = separator_from_line(&line) {
                debug!(path = %path.display(), separator = ?separator, "separator from first line");
                return separator;
            }
        }
        Ok(None) => {}
        Err(error) => {
            debug!(path = %path.display(), error = %format!("{error:#}"), "separator inference unavailable");
        }
    }
    DEFAULT_SEPARATOR.to_string()
}

/// Decide whether `path` starts with a header row. Never fails; an unreadable
/// or empty file has no header.
pub fn infer_header(path: impl AsRef<Path>, ratio: u32) -> bool {
    let path = path.as_ref();
    match first_line(path) {
        Ok(Some(line)) => {
            let header = is_header_line(&line, ratio);
            debug!(path = %path.display(), header, "header inference");
            header
        }
        Ok(None) => false,
        Err(error) => {
            debug!(path = %path.display(), error = %format!("{error:#}"), "header inference unavailable");
            false
        }
    }
}

/// Read the first non-empty line of `path` (decompressing if needed), without
/// its line terminator.
///
/// # Errors
/// Fails when the file cannot be opened or read.
pub fn first_line(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = auto_detect_reader(file, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .with_context(|| format!("read first line of {}", path.display()))?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = trim_line_end(&line);
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
}

/// Strip a trailing `\n` or `\r\n`.
pub(crate) fn trim_line_end(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
