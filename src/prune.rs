//! Expiry of unused cache entries.
//!
//! A prune run scans the `atimes` namespace once, classifying each key as
//! live or expired against a cutoff computed when the run starts. Keys whose
//! token is older than the cutoff, or is not a number at all, are removed from
//! all four namespaces. Work proceeds in batches:
//!
//! - a batch with expired keys deletes them concurrently and waits for the
//!   deletes to settle before scanning on;
//! - an all-live batch sleeps briefly so a large healthy store cannot hog
//!   the machine.
//!
//! Deletes are the only mutation, so a run that stops early leaves nothing
//! worse than stale entries for the next run.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use rayon::prelude::*;

use crate::clock::{Clock, DAY_MS, MINUTE_MS};
use crate::error::StoreError;
use crate::store::{Namespace, Records};

/// Entries unused for longer than this are expired.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(30 * DAY_MS);

/// Delay between cache construction and the prune run.
pub const DEFAULT_PRUNE_DELAY: Duration = Duration::from_millis(30 * MINUTE_MS);

/// Number of classified keys per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Pause taken after a batch with nothing to delete.
const YIELD_DELAY: Duration = Duration::from_millis(1);

/// Outcome of one prune run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Number of `atimes` records visited.
    pub scanned: usize,
    /// Number of keys classified as expired and sent for deletion.
    pub expired: usize,
    /// Number of batches processed, including a trailing partial batch.
    pub batches: usize,
}

/// Scans `atimes` and deletes expired entries.
#[derive(Clone)]
pub struct Pruner {
    records: Arc<Records>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    batch_size: usize,
}

impl std::fmt::Debug for Pruner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pruner")
            .field("max_age", &self.max_age)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Pruner {
    /// Create a pruner with the default age limit and batch size.
    #[must_use]
    pub fn new(records: Arc<Records>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records,
            clock,
            max_age: DEFAULT_MAX_AGE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the age after which an entry expires.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Execute one complete prune run.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the scan early. Deletes performed before
    /// the error are kept.
    pub fn run(&self) -> Result<PruneReport, StoreError> {
        let cutoff = self.cutoff();
        let mut report = PruneReport::default();
        let mut live = 0usize;
        let mut expired: Vec<String> = Vec::new();

        for item in self.records.range(Namespace::Atimes)? {
            let (key, token) = item?;
            report.scanned += 1;

            if is_expired(&token, cutoff) {
                expired.push(key);
            } else {
                live += 1;
            }

            if live + expired.len() >= self.batch_size {
                self.finish_batch(&mut expired, &mut report, true);
                live = 0;
            }
        }

        if live + expired.len() > 0 {
            self.finish_batch(&mut expired, &mut report, false);
        }

        Ok(report)
    }

    /// Run and log the outcome; errors end the run silently.
    pub fn run_logged(&self) -> PruneReport {
        match self.run() {
            Ok(report) => {
                log::debug!(
                    "Prune run finished: scanned {}, expired {}, batches {}",
                    report.scanned,
                    report.expired,
                    report.batches
                );
                report
            }
            Err(e) => {
                log::debug!("Prune run discarded: {}", e);
                PruneReport::default()
            }
        }
    }

    fn cutoff(&self) -> i64 {
        let now = self.clock.now_millis() as i64;
        now.saturating_sub(self.max_age.as_millis() as i64)
    }

    fn finish_batch(&self, expired: &mut Vec<String>, report: &mut PruneReport, more: bool) {
        report.batches += 1;

        if expired.is_empty() {
            if more {
                thread::sleep(YIELD_DELAY);
            }
            return;
        }

        let records = &self.records;
        expired.par_iter().for_each(|key| {
            rayon::scope(|s| {
                for namespace in Namespace::ALL {
                    s.spawn(move |_| {
                        records.remove(namespace, key);
                    });
                }
            });
        });

        report.expired += expired.len();
        expired.clear();
    }
}

/// Whether an access token is older than `cutoff` or unreadable.
///
/// Tokens must be whole integers after trimming. Anything else, including
/// `"123abc"` or `"1.5"`, is treated as expired on purpose: the cache only
/// ever writes integer tokens, so other values are foreign or damaged.
fn is_expired(token: &str, cutoff: i64) -> bool {
    match token.trim().parse::<i64>() {
        Ok(atime) => atime < cutoff,
        Err(_) => true,
    }
}

struct TimerState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/// A one-shot, cancellable prune schedule.
///
/// The run happens on a detached thread, which never keeps the process alive:
/// when the host's main thread returns, a pending timer simply disappears.
pub struct PruneTimer {
    state: Arc<TimerState>,
}

impl std::fmt::Debug for PruneTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PruneTimer")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl PruneTimer {
    /// Schedule `pruner` to run once after `delay`.
    #[must_use]
    pub fn schedule(delay: Duration, pruner: Pruner) -> Self {
        let state = Arc::new(TimerState {
            cancelled: Mutex::new(false),
            signal: Condvar::new(),
        });
        let thread_state = Arc::clone(&state);

        let spawned = thread::Builder::new()
            .name("transpile-cache-prune".to_string())
            .spawn(move || {
                let guard = thread_state
                    .cancelled
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                let (guard, _) = thread_state
                    .signal
                    .wait_timeout_while(guard, delay, |cancelled| !*cancelled)
                    .unwrap_or_else(|e| e.into_inner());
                if *guard {
                    return;
                }
                drop(guard);
                pruner.run_logged();
            });

        if let Err(e) = spawned {
            log::warn!("Failed to schedule cache pruning: {}", e);
        }

        Self { state }
    }

    /// Cancel the run if it has not started. Calling this again has no effect.
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        if !*cancelled {
            *cancelled = true;
            self.state.signal.notify_all();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }
}
