//! Error types for the transpilation cache.
//!
//! Errors fall into three channels that are kept apart on purpose:
//!
//! * [`CacheError`] - construction-time failures, returned from [`crate::Cache::new`].
//! * [`StoreError`] - storage faults raised by a [`crate::Backend`]. These never
//!   reach cache callers; the record layer logs them and degrades to a miss.
//! * [`DecodeError`] - a stored source map that is not valid JSON. This one is
//!   surfaced to the caller of [`crate::Cache::get_source_map`].

use std::path::PathBuf;

/// Errors that can occur while constructing a cache.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The configured path root is not an absolute path.
    #[error("cache requires an absolute path to resolve paths relative to, got: {0}")]
    RelativePathRoot(PathBuf),

    /// The store directory could not be created.
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The on-disk environment could not be opened.
    #[error("Failed to open cache store at {path}: {source}")]
    Open {
        /// Database file that failed to open
        path: PathBuf,
        /// The underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },
}

/// Errors raised by a storage backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The SQLite engine reported an error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// The backend is unavailable (used by alternative and test backends).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while decoding a stored record.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// The stored source map is not valid JSON.
    #[error("malformed source map for {key}: {source}")]
    SourceMap {
        /// Key of the offending record
        key: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}
