//! The `(port, protocol)` value type that every flow-log row is projected to.
//!
//! A [`Protocol`] pairs a port number with a case-folded protocol keyword
//! (`"tcp"`, `"udp"`, ...). Equality, hashing and ordering all use the port
//! first and the lowercased name second, so instances can key hash maps and be
//! sorted into report order directly.
//!
//! Names are stored as `Arc<str>` so cloning a `Protocol` on the hot path never
//! copies the keyword. A [`ProtocolPool`] can additionally intern instances that
//! are built from reference files.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use thiserror::Error;

/// Name carried by [`Protocol::unknown`] and by protocols whose code could not
/// be resolved.
pub const UNKNOWN_NAME: &str = "?";

static UNKNOWN: LazyLock<Protocol> = LazyLock::new(|| Protocol::new(0, UNKNOWN_NAME));

/// Errors raised while constructing a [`Protocol`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The port parsed as an integer but lies outside `0..=65535`.
    #[error("port {0} is outside the range 0..=65535")]
    PortOutOfRange(i64),
    /// The port is not an integer at all.
    #[error("port {0:?} is not a number")]
    InvalidPort(String),
}

/// A port number paired with a lowercase protocol keyword.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Protocol {
    port: u16,
    name: Arc<str>,
}

impl Protocol {
    /// Build a protocol from an in-range port; `name` is lowercased.
    pub fn new(port: u16, name: &str) -> Self {
        Self {
            port,
            name: Arc::from(name.to_lowercase()),
        }
    }

    /// Build a protocol from a numeric port of any width.
    ///
    /// # Errors
    /// [`ProtocolError::PortOutOfRange`] when `port` is negative or above 65535.
    pub fn from_port(port: i64, name: &str) -> Result<Self, ProtocolError> {
        let port = u16::try_from(port).map_err(|_| ProtocolError::PortOutOfRange(port))?;
        Ok(Self::new(port, name))
    }

    /// Build a protocol from a textual port, as found in table columns.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidPort`] when `port` is not an integer and
    /// [`ProtocolError::PortOutOfRange`] when it is one but does not fit a port.
    pub fn parse(port: &str, name: &str) -> Result<Self, ProtocolError> {
        Self::from_port(parse_port(port)?, name)
    }

    /// Fast path for names that are already lowercase and shared, such as the
    /// keywords held by the IANA table.
    pub(crate) fn with_shared_name(port: &str, name: &Arc<str>) -> Result<Self, ProtocolError> {
        let port = parse_port(port)?;
        let port = u16::try_from(port).map_err(|_| ProtocolError::PortOutOfRange(port))?;
        Ok(Self {
            port,
            name: Arc::clone(name),
        })
    }

    /// The sentinel for unrecognized input: port 0, name `"?"`.
    pub fn unknown() -> &'static Self {
        &UNKNOWN
    }

    /// `true` when this protocol's name is the unknown marker.
    pub fn is_unknown(&self) -> bool {
        &*self.name == UNKNOWN_NAME
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the name, for building further protocols without
    /// copying it.
    pub fn shared_name(&self) -> &Arc<str> {
        &self.name
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.name)
    }
}

fn parse_port(port: &str) -> Result<i64, ProtocolError> {
    let trimmed = port.trim();
    trimmed
        .parse::<i64>()
        .map_err(|_| ProtocolError::InvalidPort(trimmed.to_string()))
}

/// Interning pool for [`Protocol`] values.
///
/// Interning only shares storage between equal instances; it never changes
/// equality or ordering. A disabled pool hands out fresh instances, which is
/// what high-churn callers that do not retain protocols want.
#[derive(Debug)]
pub struct ProtocolPool {
    enabled: bool,
    entries: RwLock<HashSet<Protocol>>,
}

impl ProtocolPool {
    pub fn new() -> Self {
        Self::with_interning(true)
    }

    pub fn with_interning(enabled: bool) -> Self {
        Self {
            enabled,
            entries: RwLock::new(HashSet::new()),
        }
    }

    /// Parse and intern a protocol.
    ///
    /// # Errors
    /// See [`Protocol::parse`].
    pub fn intern(&self, port: &str, name: &str) -> Result<Protocol, ProtocolError> {
        let candidate = Protocol::parse(port, name)?;
        if !self.enabled {
            return Ok(candidate);
        }

        if let Some(existing) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&candidate)
        {
            return Ok(existing.clone());
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&candidate) {
            return Ok(existing.clone());
        }
        entries.insert(candidate.clone());
        Ok(candidate)
    }

    /// Number of distinct protocols held.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProtocolPool {
    fn default() -> Self {
        Self::new()
    }
}
