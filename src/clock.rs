//! Time sources for access bookkeeping and pruning.
//!
//! Access tokens are coarse on purpose: every cache hit in one process writes
//! the same token, captured once when the process first asks for it. This
//! keeps `atimes` writes idempotent within a run while still telling apart
//! "used this run" from "not used for a month".

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in a minute.
pub const MINUTE_MS: u64 = 60 * 1000;
/// Milliseconds in an hour.
pub const HOUR_MS: u64 = 60 * MINUTE_MS;
/// Milliseconds in a day.
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// A source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock frozen at a fixed instant, for tests and replay.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

static PROCESS_ACCESS_TOKEN: OnceLock<String> = OnceLock::new();

/// The process-wide access token.
///
/// Captured from the system clock on first use and never recomputed.
#[must_use]
pub fn process_access_token() -> &'static str {
    PROCESS_ACCESS_TOKEN.get_or_init(|| SystemClock.now_millis().to_string())
}
