//! # Flowtag
//!
//! Tags network flow-log records and counts them.
//!
//! A flow log is a delimited text file with one version-2 record per line.
//! Every record is reduced to a [`Protocol`]: its destination port paired with
//! the protocol keyword that the record's IANA protocol number stands for. A
//! lookup table then maps each protocol to a tag. A run produces two counts:
//!
//! - how many records carry each tag (protocols with no entry count as
//!   `Untagged`)
//! - how many records share each distinct port/protocol combination
//!
//! ## Quick Start
//!
//! ```no_run
//! use flowtag::*;
//! use std::sync::Arc;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let tables = ReferenceTables::load(
//!     &TableFileReader::open("data/iana_protocols.csv")?,
//!     &TableFileReader::open("data/lookup_table.csv")?,
//!     ProtocolPool::new(),
//!     ExecMode::default(),
//! )?;
//!
//! let mut processor = FlowLogProcessor::new(
//!     Box::new(TableFileReader::open("data/flow_log.csv")?),
//!     Arc::new(tables),
//!     Box::new(TableFileWriter::create("data/output.csv")?),
//! );
//! let counts = processor.run()?;
//! processor.close();
//! println!("{} records", counts.total());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Tables
//!
//! Every input and output is a table of string rows. [`TableSource`] yields a
//! fresh [`Rows`] pass on each call; [`TableSink`] appends rows. File-backed
//! tables ([`TableFileReader`], [`TableFileWriter`]) infer their separator
//! from the file extension or the first line, and readers also infer whether
//! the first line is a header. `.gz`, `.zst`, `.bz2` and `.xz` files are
//! decoded and encoded transparently.
//!
//! ### Reference tables
//!
//! [`IanaProtocols`] and [`Tags`] are loaded once and bundled into
//! [`ReferenceTables`], which is shared read-only by every worker.
//!
//! ### Execution
//!
//! [`ExecMode::Sequential`] counts on the calling thread; the default
//! [`ExecMode::Parallel`] folds rows on Rayon workers into per-worker counts
//! and merges them. Both produce identical results.
//!
//! ### Resources
//!
//! Row iterators release their file as soon as they are exhausted or dropped.
//! Sinks are released explicitly, through [`Release`] and [`release_all`],
//! which attempts every release and logs failures instead of stopping.

pub mod io;
pub mod lookup;
pub mod metrics;
pub mod processor;
pub mod protocol;
pub mod resources;
pub mod runner;
pub mod settings;
pub mod table;
pub mod testing;

pub use io::{ReadOptions, TableFileReader, TableFileWriter, TableRows};
pub use lookup::{IanaProtocols, ReferenceTables, TableError, Tags, UNTAGGED};
pub use metrics::MetricsCollector;
pub use processor::{Counts, FlowLogProcessor, tally};
pub use protocol::{Protocol, ProtocolError, ProtocolPool};
pub use resources::{Release, release_all};
pub use runner::ExecMode;
pub use settings::Settings;
pub use table::generator::{FlowLogGenerator, TableGenerator};
pub use table::{EmptyTable, MemorySink, MemoryTable, NoopSink, Row, Rows, TableSink, TableSource, row};
