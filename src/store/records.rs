//! Error-absorbing record layer.

use std::sync::Arc;

use super::{Backend, Namespace, ScanIter};
use crate::diagnostics::Diagnostics;
use crate::error::StoreError;

/// Reports every store operation and swallows storage failures.
///
/// Every record is reconstructible from its source file, so a failed read is
/// a miss and a failed write or delete is a no-op.
pub struct Records {
    backend: Arc<dyn Backend>,
    diagnostics: Diagnostics,
}

impl std::fmt::Debug for Records {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("backend", &"<backend>")
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl Records {
    /// Wrap a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, diagnostics: Diagnostics) -> Self {
        Self {
            backend,
            diagnostics,
        }
    }

    /// Look up a record. Failures are reported and read as absent.
    pub fn get(&self, namespace: Namespace, key: &str) -> Option<String> {
        match self.backend.get(namespace, key) {
            Ok(Some(value)) => {
                self.diagnostics.record("HIT", namespace, key);
                Some(value)
            }
            Ok(None) => {
                self.diagnostics.record("MISS", namespace, key);
                None
            }
            Err(e) => {
                self.diagnostics.error("GET", namespace, key, &e);
                None
            }
        }
    }

    /// Write a record, returning whether the write succeeded.
    pub fn put(&self, namespace: Namespace, key: &str, value: &str) -> bool {
        match self.backend.put(namespace, key, value) {
            Ok(()) => {
                self.diagnostics.record("PUT", namespace, key);
                true
            }
            Err(e) => {
                self.diagnostics.error("PUT", namespace, key, &e);
                false
            }
        }
    }

    /// Delete a record, returning whether the delete succeeded.
    ///
    /// Deleting an absent key counts as success.
    pub fn remove(&self, namespace: Namespace, key: &str) -> bool {
        match self.backend.remove(namespace, key) {
            Ok(_) => {
                self.diagnostics.record("REMOVE", namespace, key);
                true
            }
            Err(e) => {
                self.diagnostics.error("REMOVE", namespace, key, &e);
                false
            }
        }
    }

    /// Start a scan. Unlike point operations, scan errors are returned.
    pub fn range(&self, namespace: Namespace) -> Result<ScanIter<'_>, StoreError> {
        self.backend.range(namespace)
    }
}
