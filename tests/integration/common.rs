//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use transpile_cache::store::{Backend, Namespace, ScanIter, SqliteEnvironment};
use transpile_cache::StoreError;

/// A diagnostic sink that keeps everything written to it.
#[derive(Clone, Default)]
pub struct Lines(Arc<Mutex<Vec<u8>>>);

impl Write for Lines {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Lines {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

/// A SQLite backend with switchable faults.
pub struct FaultyBackend {
    pub inner: SqliteEnvironment,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    /// Fail the scan after this many records (usize::MAX = never).
    pub fail_scan_after: AtomicUsize,
}

impl FaultyBackend {
    pub fn new(inner: SqliteEnvironment) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_scan_after: AtomicUsize::new(usize::MAX),
        }
    }
}

impl Backend for FaultyBackend {
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read fault".into()));
        }
        self.inner.get(namespace, key)
    }

    fn put(&self, namespace: Namespace, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write fault".into()));
        }
        self.inner.put(namespace, key, value)
    }

    fn remove(&self, namespace: Namespace, key: &str) -> Result<bool, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write fault".into()));
        }
        self.inner.remove(namespace, key)
    }

    fn range(&self, namespace: Namespace) -> Result<ScanIter<'_>, StoreError> {
        let limit = self.fail_scan_after.load(Ordering::SeqCst);
        let scan = self.inner.range(namespace)?;
        let mut seen = 0usize;
        Ok(Box::new(scan.map(move |item| {
            if seen >= limit {
                return Err(StoreError::Unavailable("injected scan fault".into()));
            }
            seen += 1;
            item
        })))
    }
}
