//! Cache update payload.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The output of one transpilation, as stored by [`crate::Cache::update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheFile {
    /// Modification token of the source file when it was transpiled.
    pub mtime: String,
    /// Transpiled code.
    pub code: String,
    /// Source map object.
    pub map: serde_json::Value,
}

impl CacheFile {
    /// Create a payload.
    pub fn new(mtime: impl Into<String>, code: impl Into<String>, map: serde_json::Value) -> Self {
        Self {
            mtime: mtime.into(),
            code: code.into(),
            map,
        }
    }

    /// Format a modification time as a token (milliseconds since the epoch).
    ///
    /// Times before the epoch format as `0`.
    #[must_use]
    pub fn mtime_token(modified: SystemTime) -> String {
        modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
            .to_string()
    }
}
