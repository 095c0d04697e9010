//! Transparent compression for table files.
//!
//! Flow logs are frequently shipped compressed. Readers and writers in this
//! crate pass their file handles through [`auto_detect_reader`] /
//! [`auto_detect_writer`], which wrap them with the matching codec:
//!
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! Extensions are checked first; readers fall back to magic bytes. With no
//! codec features enabled both functions are plain buffering pass-throughs.
//!
//! Wrapped streams are `Send` so row iterators built on them can be handed to
//! worker threads.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Readable byte stream that may be moved across threads.
pub type DynRead = Box<dyn Read + Send>;

/// Writable byte stream that may be moved across threads.
pub type DynWrite = Box<dyn Write + Send>;

/// A compression algorithm that can wrap readers and writers.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// File extensions associated with this codec, lowercase with the leading dot.
    fn extensions(&self) -> &[&str];

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead>;

    /// Wrap a writer with compression.
    fn wrap_writer(&self, writer: DynWrite) -> std::io::Result<DynWrite>;
}

static CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
    #[cfg(feature = "compression-bzip2")]
    &Bzip2Codec,
    #[cfg(feature = "compression-xz")]
    &XzCodec,
];

/// Codecs compiled into this build.
pub fn codecs() -> &'static [&'static dyn CompressionCodec] {
    CODECS
}

/// Find the codec whose extension ends `path` (case-insensitive).
pub fn detect_from_extension(path: impl AsRef<Path>) -> Option<&'static dyn CompressionCodec> {
    let lowered = path.as_ref().to_string_lossy().to_lowercase();
    CODECS
        .iter()
        .copied()
        .find(|codec| codec.extensions().iter().any(|ext| lowered.ends_with(ext)))
}

/// Strip a recognized compression extension: `flow.tsv.gz` becomes `flow.tsv`.
///
/// Paths without a codec extension are returned unchanged.
pub fn strip_compression_extension(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Some(file_name) = path.file_name().map(|f| f.to_string_lossy().into_owned()) else {
        return path.to_path_buf();
    };
    for codec in CODECS {
        for ext in codec.extensions() {
            let Some(split) = file_name.len().checked_sub(ext.len()) else {
                continue;
            };
            if split > 0
                && file_name
                    .get(split..)
                    .is_some_and(|tail| tail.eq_ignore_ascii_case(ext))
            {
                return path.with_file_name(&file_name[..split]);
            }
        }
    }
    path.to_path_buf()
}

/// Peek at the start of `reader` and match registered magic bytes. The reader
/// is not advanced.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<&'static dyn CompressionCodec> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    CODECS.iter().copied().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| buf.len() >= magic.len() && buf.starts_with(magic))
    })
}

/// Wrap `reader` with decompression when `path_hint` or the stream's first
/// bytes identify a codec.
///
/// # Errors
/// Fails when the codec rejects the stream header.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<DynRead> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec
            .wrap_reader(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return codec
            .wrap_reader(Box::new(buf_reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    Ok(Box::new(buf_reader))
}

/// Wrap `writer` with compression when `path_hint` has a codec extension,
/// otherwise with a plain `BufWriter`.
///
/// # Errors
/// Fails when the codec cannot be initialized.
pub fn auto_detect_writer<W: Write + Send + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<DynWrite> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec
            .wrap_writer(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }

    Ok(Box::new(BufWriter::new(writer)))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        // Multi-member so appended gzip output reads back whole.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as DynRead)
    }

    fn wrap_writer(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e.auto_finish()) as DynWrite)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x42, 0x5a, 0x68])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}
