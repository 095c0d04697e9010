//! Execution modes.
//!
//! Work over a row stream runs either sequentially on the calling thread or as
//! a data-parallel fan-out on Rayon workers. Parallel work uses the global
//! Rayon pool unless a thread count is given, in which case a dedicated pool is
//! built for the call so repeated runs with different sizes do not interfere.
//!
//! In JSON a mode is either a bare name (`"sequential"`, `"parallel"`) or a
//! map with per-mode options (`{"parallel": {"threads": 4}}`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "ModeConfig")]
pub enum ExecMode {
    /// Single-threaded, in stream order. Useful for debugging and as the
    /// reference for parallel results.
    Sequential,
    /// Multi-threaded; `threads: None` uses the global pool (one worker per CPU).
    Parallel { threads: Option<usize> },
}

/// Accepted JSON shapes for [`ExecMode`].
#[derive(Deserialize)]
#[serde(untagged)]
enum ModeConfig {
    Name(ModeName),
    Options(ModeOptions),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeName {
    Sequential,
    Parallel,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeOptions {
    Sequential {},
    Parallel {
        #[serde(default)]
        threads: Option<usize>,
    },
}

impl From<ModeConfig> for ExecMode {
    fn from(config: ModeConfig) -> Self {
        match config {
            ModeConfig::Name(ModeName::Sequential)
            | ModeConfig::Options(ModeOptions::Sequential {}) => Self::Sequential,
            ModeConfig::Name(ModeName::Parallel) => Self::parallel(),
            ModeConfig::Options(ModeOptions::Parallel { threads }) => {
                threads.map_or_else(Self::parallel, Self::with_threads)
            }
        }
    }
}

impl Default for ExecMode {
    fn default() -> Self {
        Self::Parallel { threads: None }
    }
}

impl ExecMode {
    pub fn parallel() -> Self {
        Self::default()
    }

    pub fn with_threads(threads: usize) -> Self {
        Self::Parallel {
            threads: Some(threads.max(1)),
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel { .. })
    }

    /// Worker count this mode will use.
    pub fn workers(&self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Parallel { threads: Some(t) } => *t,
            Self::Parallel { threads: None } => num_cpus::get(),
        }
    }

    /// Run `job` in the pool this mode selects. Sequential mode runs it inline.
    ///
    /// # Errors
    /// Fails when a dedicated pool cannot be built.
    pub fn install<R, F>(self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match self {
            Self::Sequential | Self::Parallel { threads: None } => Ok(job()),
            Self::Parallel { threads: Some(threads) } => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("flowtag-worker-{i}"))
                    .build()
                    .with_context(|| format!("build thread pool with {threads} threads"))?;
                Ok(pool.install(job))
            }
        }
    }
}
