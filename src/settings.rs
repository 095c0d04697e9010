//! Run configuration.
//!
//! [`Settings`] carries the switches the processor consumes: the debug flag
//! (mirror raw rows to a side file and count them), the execution mode and the
//! header-inference ratio. It is built once at start-up, from defaults, the
//! environment, a JSON file, or CLI flags, and passed down explicitly.
//!
//! | Variable | Effect |
//! |---|---|
//! | `FLOWTAG_DEBUG` | `1`/`true` enables debug mode |
//! | `FLOWTAG_SEQUENTIAL` | `1`/`true` selects [`ExecMode::Sequential`] |
//! | `FLOWTAG_THREADS` | worker count for parallel mode |
//! | `FLOWTAG_DEBUG_PATH` | where debug mode mirrors input rows |
//!
//! A JSON file may set any subset of the fields, for example
//! `{"debug": true, "mode": {"parallel": {"threads": 4}}}`; `"mode"` also takes
//! the bare names `"sequential"` and `"parallel"`.

use crate::io::infer::DEFAULT_HEADER_RATIO;
use crate::runner::ExecMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DATA_DIRECTORY: &str = "data";
pub const FLOW_LOG_FILE: &str = "flow_log.csv";
pub const LOOKUP_TABLE_FILE: &str = "lookup_table.csv";
pub const IANA_PROTOCOLS_FILE: &str = "iana_protocols.csv";
pub const OUTPUT_FILE: &str = "output.csv";
pub const DEBUG_FILE: &str = "debug.csv";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Mirror every raw input row to `debug_path` and count rows.
    pub debug: bool,
    pub mode: ExecMode,
    pub debug_path: PathBuf,
    /// Letters-per-digit ratio for header inference.
    pub header_ratio: u32,
    /// Intern protocols built from reference tables.
    pub intern: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            mode: ExecMode::default(),
            debug_path: data_path(DEBUG_FILE),
            header_ratio: DEFAULT_HEADER_RATIO,
            intern: true,
        }
    }
}

impl Settings {
    /// Defaults overridden by `FLOWTAG_*` environment variables.
    ///
    /// # Errors
    /// Fails when `FLOWTAG_THREADS` is set but not a positive integer.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Load from a JSON file; missing fields take their defaults.
    ///
    /// # Errors
    /// Fails when the file cannot be opened or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse settings from {}", path.display()))
    }

    /// Apply overrides from `lookup` (an environment accessor).
    ///
    /// # Errors
    /// Fails when `FLOWTAG_THREADS` is set but not a positive integer.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("FLOWTAG_DEBUG") {
            self.debug = is_truthy(&value);
        }
        if let Some(value) = lookup("FLOWTAG_DEBUG_PATH") {
            self.debug_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("FLOWTAG_THREADS") {
            let threads: usize = value
                .trim()
                .parse()
                .with_context(|| format!("FLOWTAG_THREADS={value:?} is not a thread count"))?;
            anyhow::ensure!(threads > 0, "FLOWTAG_THREADS must be positive");
            self.mode = ExecMode::with_threads(threads);
        }
        if lookup("FLOWTAG_SEQUENTIAL").is_some_and(|v| is_truthy(&v)) {
            self.mode = ExecMode::Sequential;
        }
        Ok(self)
    }
}

/// `data/<file>` relative to the working directory.
pub fn data_path(file: &str) -> PathBuf {
    Path::new(DATA_DIRECTORY).join(file)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
