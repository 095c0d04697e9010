//! Reference tables consulted while counting.
//!
//! - [`IanaProtocols`] maps a numeric protocol code (the `protocol` column of a
//!   flow log) to its canonical keyword, e.g. `6` → `tcp`.
//! - [`Tags`] maps a [`Protocol`] (destination port + keyword) to a tag.
//!
//! Both are built once from a [`TableSource`] and are read-only afterwards, so
//! they can be shared across worker threads without locking. Construction may
//! itself run in parallel; duplicate keys still resolve last-write-wins in file
//! order because every entry carries the index of the row it came from.
//!
//! [`ReferenceTables`] bundles the two tables with the [`ProtocolPool`] used to
//! build them. It is the context object handed to
//! [`crate::processor::FlowLogProcessor`].

use crate::protocol::{Protocol, ProtocolPool};
use crate::runner::ExecMode;
use crate::table::{Row, TableSource};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Tag reported for protocols absent from the tag table.
pub const UNTAGGED: &str = "Untagged";

/// Structural problems in reference-table rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("row {row} has {found} columns, expected at least {expected}: {columns:?}")]
    MissingColumn {
        row: usize,
        found: usize,
        expected: usize,
        columns: Row,
    },
}

/// Numeric protocol code → canonical [`Protocol`] (`port` = code, `name` =
/// keyword).
#[derive(Clone, Debug, Default)]
pub struct IanaProtocols {
    by_code: HashMap<u32, Protocol>,
}

impl IanaProtocols {
    /// Column holding the decimal protocol code.
    pub const DECIMAL: usize = 0;
    /// Column holding the protocol keyword.
    pub const KEYWORD: usize = 1;

    /// Build from `(code, keyword, ...)` rows.
    ///
    /// Rows whose code is not purely numeric (registry range markers such as
    /// `143-252`, the header row) or that lack a keyword column are dropped.
    ///
    /// # Errors
    /// Fails only when `source` cannot be read.
    pub fn load(source: &dyn TableSource, mode: ExecMode) -> Result<Self> {
        let rows = source
            .rows()
            .with_context(|| format!("read IANA protocols from {}", source.describe()))?;
        let by_code = collect_last_wins(rows, mode, |_, row| Ok(Self::entry(&row)))?;
        info!(protocols = by_code.len(), source = %source.describe(), "loaded IANA protocols");
        Ok(Self { by_code })
    }

    /// Build from explicit `(code, keyword)` pairs; later pairs win.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: AsRef<str>,
    {
        let by_code = entries
            .into_iter()
            .filter_map(|(code, keyword)| {
                let port = u16::try_from(code).ok()?;
                Some((code, Protocol::new(port, keyword.as_ref())))
            })
            .collect();
        Self { by_code }
    }

    /// A small built-in table of the most common protocol numbers.
    pub fn well_known() -> Self {
        Self::from_entries([
            (1, "ICMP"),
            (2, "IGMP"),
            (4, "IPv4"),
            (6, "TCP"),
            (17, "UDP"),
            (41, "IPv6"),
            (47, "GRE"),
            (50, "ESP"),
            (51, "AH"),
            (58, "IPv6-ICMP"),
            (132, "SCTP"),
        ])
    }

    fn entry(row: &[String]) -> Option<(u32, Protocol)> {
        let code = row.get(Self::DECIMAL)?.trim();
        let keyword = row.get(Self::KEYWORD)?.trim();
        if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number = code.parse::<u32>().ok()?;
        let port = u16::try_from(number).ok()?;
        Some((number, Protocol::new(port, keyword)))
    }

    /// Canonical protocol for a numeric code string such as `"6"` or `"06"`.
    pub fn get(&self, code: &str) -> Option<&Protocol> {
        let number = code.trim().parse::<u32>().ok()?;
        self.by_code.get(&number)
    }

    /// Like [`get`](Self::get), falling back to [`Protocol::unknown`].
    pub fn resolve(&self, code: &str) -> &Protocol {
        self.get(code).unwrap_or(Protocol::unknown())
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// [`Protocol`] → tag.
#[derive(Clone, Debug)]
pub struct Tags {
    by_protocol: HashMap<Protocol, Arc<str>>,
    untagged: Arc<str>,
}

impl Default for Tags {
    fn default() -> Self {
        Self {
            by_protocol: HashMap::new(),
            untagged: Arc::from(UNTAGGED),
        }
    }
}

impl Tags {
    /// Column holding the destination port.
    pub const PORT: usize = 0;
    /// Column holding the protocol keyword.
    pub const PROTOCOL: usize = 1;
    /// Column holding the tag.
    pub const TAG: usize = 2;

    /// Build from `(port, protocol, tag)` rows. Later rows win on duplicate
    /// protocols.
    ///
    /// # Errors
    /// Fails when `source` cannot be read, when a row has fewer than three
    /// columns ([`TableError`]) or when a port is invalid
    /// ([`crate::protocol::ProtocolError`]).
    pub fn load(source: &dyn TableSource, pool: &ProtocolPool, mode: ExecMode) -> Result<Self> {
        let rows = source
            .rows()
            .with_context(|| format!("read tags from {}", source.describe()))?;
        let entries = collect_last_wins(rows, mode, |index, row| {
            if row.len() <= Self::TAG {
                return Err(TableError::MissingColumn {
                    row: index + 1,
                    found: row.len(),
                    expected: Self::TAG + 1,
                    columns: row,
                }
                .into());
            }
            let protocol = pool
                .intern(&row[Self::PORT], row[Self::PROTOCOL].trim())
                .with_context(|| format!("tag row {}: {:?}", index + 1, row))?;
            Ok(Some((protocol, Arc::<str>::from(row[Self::TAG].trim()))))
        })
        .with_context(|| format!("load tags from {}", source.describe()))?;
        info!(tags = entries.len(), source = %source.describe(), "loaded tags");
        Ok(Self {
            by_protocol: entries,
            ..Self::default()
        })
    }

    /// Build from explicit `(protocol, tag)` pairs; later pairs win.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Protocol, S)>,
        S: AsRef<str>,
    {
        Self {
            by_protocol: entries
                .into_iter()
                .map(|(protocol, tag)| (protocol, Arc::from(tag.as_ref())))
                .collect(),
            ..Self::default()
        }
    }

    pub fn get(&self, protocol: &Protocol) -> Option<&Arc<str>> {
        self.by_protocol.get(protocol)
    }

    /// Tag for `protocol`, or the shared [`UNTAGGED`] sentinel.
    pub fn tag(&self, protocol: &Protocol) -> &Arc<str> {
        self.by_protocol.get(protocol).unwrap_or(&self.untagged)
    }

    pub fn len(&self) -> usize {
        self.by_protocol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_protocol.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Protocol, &str)> {
        self.by_protocol.iter().map(|(p, t)| (p, &**t))
    }
}

/// The lookup context for a run: built once, shared read-only.
#[derive(Debug, Default)]
pub struct ReferenceTables {
    pub iana: IanaProtocols,
    pub tags: Tags,
    pub pool: ProtocolPool,
}

impl ReferenceTables {
    pub fn new(iana: IanaProtocols, tags: Tags) -> Self {
        Self {
            iana,
            tags,
            pool: ProtocolPool::new(),
        }
    }

    /// Load both tables from their sources.
    ///
    /// # Errors
    /// See [`IanaProtocols::load`] and [`Tags::load`].
    pub fn load(
        iana: &dyn TableSource,
        tags: &dyn TableSource,
        pool: ProtocolPool,
        mode: ExecMode,
    ) -> Result<Self> {
        let iana = IanaProtocols::load(iana, mode)?;
        let tags = Tags::load(tags, &pool, mode)?;
        Ok(Self { iana, tags, pool })
    }

    /// Tag for an already-resolved protocol.
    pub fn tag(&self, protocol: &Protocol) -> &Arc<str> {
        self.tags.tag(protocol)
    }
}

/// Fold rows into a map where, on duplicate keys, the entry from the later row
/// wins, whatever order workers finish in.
///
/// `entry` receives the row index and the row; `Ok(None)` drops the row.
fn collect_last_wins<K, V, F>(
    rows: crate::table::Rows,
    mode: ExecMode,
    entry: F,
) -> Result<HashMap<K, V>>
where
    K: Eq + Hash + Send,
    V: Send,
    F: Fn(usize, Row) -> Result<Option<(K, V)>> + Sync + Send,
{
    type Indexed<K, V> = HashMap<K, (usize, V)>;

    fn keep_later<K: Eq + Hash, V>(map: &mut Indexed<K, V>, key: K, index: usize, value: V) {
        match map.get_mut(&key) {
            Some(slot) if slot.0 > index => {}
            Some(slot) => *slot = (index, value),
            None => {
                map.insert(key, (index, value));
            }
        }
    }

    let step = |mut map: Indexed<K, V>, (index, row): (usize, Result<Row>)| -> Result<Indexed<K, V>> {
        if let Some((key, value)) = entry(index, row?)? {
            keep_later(&mut map, key, index, value);
        }
        Ok(map)
    };

    let indexed = match mode {
        ExecMode::Sequential => rows.enumerate().try_fold(HashMap::new(), step)?,
        ExecMode::Parallel { .. } => mode.install(|| {
            rows.enumerate()
                .par_bridge()
                .try_fold(HashMap::new, step)
                .try_reduce(HashMap::new, |mut left, right| {
                    for (key, (index, value)) in right {
                        keep_later(&mut left, key, index, value);
                    }
                    Ok(left)
                })
        })??,
    };

    Ok(indexed.into_iter().map(|(k, (_, v))| (k, v)).collect())
}
