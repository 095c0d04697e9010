//! Test helpers: temporary files and small reference fixtures.
//!
//! ```
//! use flowtag::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let flow_log = TempFilePath::with_extension("log")?;
//! write_lines(flow_log.path(), SAMPLE_FLOW_LOG)?;
//! assert_eq!(read_lines(flow_log.path())?.len(), SAMPLE_FLOW_LOG.len());
//! # Ok(())
//! # }
//! ```

use crate::lookup::{IanaProtocols, ReferenceTables, Tags};
use crate::protocol::Protocol;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// Five version-2 flow-log records (space separated) covering tagged and
/// untagged destinations.
pub const SAMPLE_FLOW_LOG: &[&str] = &[
    "2 123456789012 eni-5f6g7h8i 10.0.2.103 52.26.198.183 56000 23 6 15 7500 1620140661 1620140721 REJECT OK",
    "2 123456789012 eni-9k10l11m 192.168.1.5 51.15.99.115 49321 25 6 20 10000 1620140661 1620140721 ACCEPT OK",
    "2 123456789012 eni-1a2b3c4d 192.168.1.6 87.250.250.242 49152 110 6 5 2500 1620140661 1620140721 ACCEPT OK",
    "2 123456789012 eni-1a2b3c4d 10.0.1.102 172.217.7.228 1030 443 6 8 4000 1620140661 1620140721 ACCEPT OK",
    "2 123456789012 eni-2d2e2f3g 192.168.2.7 77.88.55.80 49153 993 6 7 3500 1620140661 1620140721 ACCEPT OK",
];

/// Tag table for [`SAMPLE_FLOW_LOG`], with a header line.
pub const SAMPLE_LOOKUP_TABLE: &[&str] = &[
    "dstport,protocol,tag",
    "23,tcp,sv_P1",
    "25,tcp,sv_P1",
    "443,tcp,sv_P2",
];

/// Excerpt of the IANA protocol-number registry, with a header line and a
/// range row that loading must skip.
pub const SAMPLE_IANA_PROTOCOLS: &[&str] = &[
    "Decimal,Keyword,Protocol",
    "1,ICMP,Internet Control Message",
    "6,TCP,Transmission Control",
    "17,UDP,User Datagram",
    "58,IPv6-ICMP,ICMP for IPv6",
    "146-252,,Unassigned",
];

/// [`ReferenceTables`] equivalent to the sample lookup and IANA files.
pub fn sample_reference_tables() -> ReferenceTables {
    let iana = IanaProtocols::from_entries([(1, "icmp"), (6, "tcp"), (17, "udp"), (58, "ipv6-icmp")]);
    let tags = Tags::from_entries([
        (Protocol::new(23, "tcp"), "sv_P1"),
        (Protocol::new(25, "tcp"), "sv_P1"),
        (Protocol::new(443, "tcp"), "sv_P2"),
    ]);
    ReferenceTables::new(iana, tags)
}

/// A temporary file, deleted on drop.
pub struct TempFilePath {
    _file: NamedTempFile,
    path: PathBuf,
}

impl TempFilePath {
    /// # Errors
    /// Fails when the temporary file cannot be created.
    pub fn new() -> std::io::Result<Self> {
        Self::from_file(NamedTempFile::new()?)
    }

    /// Temporary file whose name ends in `.{extension}`, for tests that rely on
    /// extension-based inference.
    ///
    /// # Errors
    /// Fails when the temporary file cannot be created.
    pub fn with_extension(extension: &str) -> std::io::Result<Self> {
        Self::from_file(
            tempfile::Builder::new()
                .suffix(&format!(".{extension}"))
                .tempfile()?,
        )
    }

    fn from_file(file: NamedTempFile) -> std::io::Result<Self> {
        let path = file.path().to_path_buf();
        Ok(Self { _file: file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A temporary directory, removed with its contents on drop.
pub struct TempDirPath {
    _dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// # Errors
    /// Fails when the directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().to_path_buf();
        Ok(Self { _dir: dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }
}

/// Write `lines` to `path`, one per line, replacing any existing content.
///
/// # Errors
/// Fails when the file cannot be created or written.
pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{}", line.as_ref()).with_context(|| format!("write {}", path.display()))?;
    }
    out.flush()
        .with_context(|| format!("flush {}", path.display()))
}

/// Every line of `path`, without terminators.
///
/// # Errors
/// Fails when the file cannot be read.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(content.lines().map(str::to_string).collect())
}
