//! Record storage for the transpilation cache.
//!
//! # Architecture
//!
//! The storage system is split into two layers:
//!
//! * [`database`]: the SQLite environment holding the four namespaces, and the
//!   raw [`Backend`] primitives. Backend methods return [`StoreError`] on failure.
//! * [`records`]: wraps any [`Backend`] and reports every operation through the
//!   diagnostic channel. Read and write failures are logged and turned into
//!   misses or no-ops, so a broken store never takes the host process down.
//!
//! # Namespaces
//!
//! All four namespaces are addressed with the same key for one cached file:
//!
//! * `codes` - transpiled source text
//! * `atimes` - last-access token, used only by the pruner
//! * `mtimes` - source modification token at write time
//! * `sourceMaps` - JSON-encoded source map

use std::fmt;

use crate::error::StoreError;

pub mod database;
pub mod records;

pub use database::{SqliteEnvironment, DB_FILE_NAME};
pub use records::Records;

/// One of the four independently addressable key/value maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Transpiled code.
    Codes,
    /// Last-access tokens.
    Atimes,
    /// Source modification tokens.
    Mtimes,
    /// Serialized source maps.
    SourceMaps,
}

impl Namespace {
    /// Every namespace, in the order records are written by an update.
    pub const ALL: [Namespace; 4] = [
        Namespace::Atimes,
        Namespace::Mtimes,
        Namespace::Codes,
        Namespace::SourceMaps,
    ];

    /// The on-disk name of the namespace.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Codes => "codes",
            Self::Atimes => "atimes",
            Self::Mtimes => "mtimes",
            Self::SourceMaps => "sourceMaps",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A forward scan over one namespace.
///
/// Yields `(key, value)` pairs in key order. An `Err` item ends the scan.
pub type ScanIter<'a> = Box<dyn Iterator<Item = Result<(String, String), StoreError>> + Send + 'a>;

/// Raw storage primitives over the four namespaces.
///
/// Implementations must be safe to call from many threads at once.
pub trait Backend: Send + Sync {
    /// Look up `key`; `Ok(None)` when absent.
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite `key`.
    fn put(&self, namespace: Namespace, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`, returning whether it existed.
    fn remove(&self, namespace: Namespace, key: &str) -> Result<bool, StoreError>;

    /// Start a new forward scan over the namespace.
    ///
    /// The scan is finite: records added after it starts with keys beyond the
    /// last key present at that moment are not visited.
    fn range(&self, namespace: Namespace) -> Result<ScanIter<'_>, StoreError>;
}
