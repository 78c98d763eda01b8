//! The transpilation cache.
//!
//! [`Cache`] memoizes transpiler output per source file. Lookups are keyed by
//! absolute path; the key is the configured prefix plus the path relative to
//! the configured root (see [`crate::key`]).
//!
//! # Access bookkeeping
//!
//! A code hit writes the process access token into `atimes` on the rayon
//! pool without waiting for it. Every hit in one process writes the same
//! token, so the record is only rewritten with an identical value.
//!
//! # Failure model
//!
//! Store failures never reach callers: reads degrade to misses and writes to
//! no-ops, both reported through the diagnostic channel. The one exception is
//! a stored source map that is not valid JSON, which
//! [`Cache::get_source_map`] returns as a [`DecodeError`].
//!
//! # Example
//!
//! ```no_run
//! use transpile_cache::{Cache, CacheConfig, CacheFile};
//! use std::path::Path;
//!
//! let config = CacheConfig::new("/repo").with_prefix("node:").with_dir("/repo/.cache");
//! let cache = Cache::new(config).expect("cache directory should be writable");
//!
//! let path = Path::new("/repo/src/index.ts");
//! if cache.get_code(path).is_none() {
//!     let file = CacheFile::new("1700000000000", "\"use strict\";", serde_json::json!({}));
//!     cache.update(path, &file);
//! }
//! cache.close();
//! ```

pub mod entry;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use crate::clock::{process_access_token, Clock, SystemClock};
use crate::config::CacheConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{CacheError, DecodeError};
use crate::key::derive_key;
use crate::prune::{PruneReport, PruneTimer, Pruner};
use crate::store::{Backend, Namespace, Records, SqliteEnvironment};

pub use entry::CacheFile;

/// Persistent, disk-backed transpilation cache.
pub struct Cache {
    records: Arc<Records>,
    prefix: String,
    path_root: PathBuf,
    access_token: Arc<str>,
    pruner: Pruner,
    timer: PruneTimer,
    in_flight: Arc<InFlight>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("prefix", &self.prefix)
            .field("path_root", &self.path_root)
            .field("access_token", &self.access_token)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Open the store in `config.dir` and schedule the prune run.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::RelativePathRoot`] if `config.path_root` is not
    /// absolute, or an open error if the store cannot be created.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        check_path_root(&config.path_root)?;
        let env = SqliteEnvironment::open_with_timeout(&config.dir, config.busy_timeout())?;
        Self::with_backend(config, Arc::new(env))
    }

    /// Build a cache over an existing backend. `config.dir` is not used.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::RelativePathRoot`] if `config.path_root` is not absolute.
    pub fn with_backend(config: CacheConfig, backend: Arc<dyn Backend>) -> Result<Self, CacheError> {
        check_path_root(&config.path_root)?;

        let mut diagnostics = Diagnostics::new(config.log.clone());
        if config.quiet_stderr {
            diagnostics = diagnostics.without_stderr();
        }
        let records = Arc::new(Records::new(backend, diagnostics));

        let access_token: Arc<str> = match config.clock {
            Some(ref clock) => clock.now_millis().to_string().into(),
            None => process_access_token().into(),
        };
        let clock: Arc<dyn Clock> = config.clock.clone().unwrap_or_else(|| Arc::new(SystemClock));

        let pruner = Pruner::new(Arc::clone(&records), clock)
            .with_max_age(config.max_age())
            .with_batch_size(config.batch_size);
        let timer = PruneTimer::schedule(config.prune_delay(), pruner.clone());

        Ok(Self {
            records,
            prefix: config.prefix,
            path_root: config.path_root,
            access_token,
            pruner,
            timer,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// The key used for `path`.
    pub fn key_for(&self, path: impl AsRef<Path>) -> String {
        derive_key(&self.prefix, path.as_ref(), &self.path_root)
    }

    /// The access token this cache writes into `atimes`.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Stored modification token for `path`.
    pub fn get_mtime(&self, path: impl AsRef<Path>) -> Option<String> {
        self.records.get(Namespace::Mtimes, &self.key_for(path))
    }

    /// Stored code for `path`. A hit also refreshes the entry's access token
    /// in the background.
    pub fn get_code(&self, path: impl AsRef<Path>) -> Option<String> {
        let key = self.key_for(path);
        let code = self.records.get(Namespace::Codes, &key)?;

        let records = Arc::clone(&self.records);
        let token = Arc::clone(&self.access_token);
        let pending = self.in_flight.begin();
        rayon::spawn(move || {
            let _pending = pending;
            records.put(Namespace::Atimes, &key, &token);
        });

        Some(code)
    }

    /// Stored source map for `path`, parsed from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::SourceMap`] if the stored record is not valid JSON.
    pub fn get_source_map(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Option<serde_json::Value>, DecodeError> {
        let key = self.key_for(path);
        match self.records.get(Namespace::SourceMaps, &key) {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| DecodeError::SourceMap { key, source }),
            None => Ok(None),
        }
    }

    /// Store a fresh transpilation result for `path`.
    ///
    /// All four records are written concurrently and this call returns once
    /// every write has settled. Failed writes are reported and otherwise ignored.
    pub fn update(&self, path: impl AsRef<Path>, file: &CacheFile) {
        let key = self.key_for(path);
        let map = file.map.to_string();
        let records = &self.records;
        let key = key.as_str();

        rayon::scope(|s| {
            s.spawn(|_| {
                records.put(Namespace::Atimes, key, &self.access_token);
            });
            s.spawn(|_| {
                records.put(Namespace::Mtimes, key, &file.mtime);
            });
            s.spawn(|_| {
                records.put(Namespace::Codes, key, &file.code);
            });
            s.spawn(|_| {
                records.put(Namespace::SourceMaps, key, &map);
            });
        });
    }

    /// Cancel the pending prune run. Idempotent; the store stays usable.
    pub fn close(&self) {
        self.timer.cancel();
    }

    /// Run one prune pass now, on the calling thread.
    ///
    /// Errors end the run early and yield the default report.
    pub fn prune_now(&self) -> PruneReport {
        self.pruner.run_logged()
    }

    /// Block until every background access write issued before this call has
    /// finished. Writes started while waiting are not waited for.
    pub fn settle(&self) {
        self.in_flight.wait();
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_path_root(path_root: &Path) -> Result<(), CacheError> {
    if path_root.is_absolute() {
        Ok(())
    } else {
        Err(CacheError::RelativePathRoot(path_root.to_path_buf()))
    }
}

/// Tracks fire-and-forget writes by generation.
///
/// Each write belongs to the generation current when it started. A waiter
/// closes the current generation and only waits for writes from closed ones,
/// so hits issued after `wait` begins never extend it.
#[derive(Default)]
struct InFlight {
    state: Mutex<Generations>,
    idle: Condvar,
}

#[derive(Default)]
struct Generations {
    current: u64,
    pending: BTreeMap<u64, usize>,
}

impl InFlight {
    fn begin(self: &Arc<Self>) -> PendingWrite {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let generation = state.current;
        *state.pending.entry(generation).or_insert(0) += 1;
        PendingWrite {
            in_flight: Arc::clone(self),
            generation,
        }
    }

    fn wait(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let target = state.current;
        state.current += 1;
        let _state = self
            .idle
            .wait_while(state, |state| state.pending.range(..=target).next().is_some())
            .unwrap_or_else(|e| e.into_inner());
    }
}

/// Marks one background write; finishing (or panicking) releases it.
struct PendingWrite {
    in_flight: Arc<InFlight>,
    generation: u64,
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        let mut state = self.in_flight.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = state.pending.get_mut(&self.generation) {
            *count -= 1;
            if *count == 0 {
                state.pending.remove(&self.generation);
                self.in_flight.idle.notify_all();
            }
        }
    }
}
