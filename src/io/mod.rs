//! File-backed tables.
//!
//! - [`reader`]: streaming row source over a delimited text file
//! - [`writer`]: line-oriented row sink over a delimited text file
//! - [`infer`]: separator and header-row heuristics used when the caller does
//!   not specify them
//! - [`compression`]: transparent decompression/compression selected by file
//!   extension or magic bytes

pub mod compression;
pub mod infer;
pub mod reader;
pub mod writer;

pub use reader::{ReadOptions, TableFileReader, TableRows};
pub use writer::TableFileWriter;
