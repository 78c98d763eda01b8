//! Cache configuration.
//!
//! A [`CacheConfig`] can be built in code or loaded in layers with figment:
//!
//! 1. Defaults (platform cache directory, 30 minute prune delay, 30 day expiry)
//! 2. An optional TOML file
//! 3. `TRANSPILE_CACHE_*` environment variables (e.g. `TRANSPILE_CACHE_PREFIX`)
//! 4. `CACHE_DIR`, which overrides `dir` and resolves relative to `path_root`
//!    so parallel CI jobs can each point at their own store.
//!
//! The diagnostic sink and the clock are runtime-only and never serialized.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, DAY_MS};
use crate::diagnostics::DiagnosticLog;
use crate::prune::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_AGE, DEFAULT_PRUNE_DELAY};
use crate::store::database::DEFAULT_BUSY_TIMEOUT;

/// Environment variable prefix for layered loading.
pub const ENV_PREFIX: &str = "TRANSPILE_CACHE_";

/// Environment variable overriding the store directory.
pub const CACHE_DIR_ENV: &str = "CACHE_DIR";

/// Configuration for a [`crate::Cache`].
#[derive(Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Key prefix separating logically distinct caches sharing one store.
    #[serde(default)]
    pub prefix: String,
    /// Absolute directory that cached paths are made relative to.
    pub path_root: PathBuf,
    /// Directory holding the store.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Milliseconds between cache construction and the prune run.
    #[serde(default = "default_prune_delay_ms")]
    pub prune_delay_ms: u64,
    /// Days an entry may go unused before it is pruned.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
    /// Keys classified per prune batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Milliseconds to wait for a lock held by another process.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Optional trace sink.
    #[serde(skip)]
    pub log: Option<DiagnosticLog>,
    /// Clock used for the access token and the prune cutoff.
    #[serde(skip)]
    pub clock: Option<Arc<dyn Clock>>,
    /// Suppress the stderr copy of store errors.
    #[serde(skip)]
    pub quiet_stderr: bool,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("prefix", &self.prefix)
            .field("path_root", &self.path_root)
            .field("dir", &self.dir)
            .field("prune_delay_ms", &self.prune_delay_ms)
            .field("max_age_days", &self.max_age_days)
            .field("batch_size", &self.batch_size)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .field("log", &self.log)
            .field("clock", &self.clock.as_ref().map(|_| "<clock>"))
            .field("quiet_stderr", &self.quiet_stderr)
            .finish()
    }
}

fn default_dir() -> PathBuf {
    ProjectDirs::from("com", "transpile-cache", "transpile-cache")
        .map(|dirs| dirs.cache_dir().join("transpile"))
        .unwrap_or_else(|| std::env::temp_dir().join("transpile-cache"))
}

fn default_prune_delay_ms() -> u64 {
    DEFAULT_PRUNE_DELAY.as_millis() as u64
}

fn default_max_age_days() -> u64 {
    DEFAULT_MAX_AGE.as_millis() as u64 / DAY_MS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT.as_millis() as u64
}

impl CacheConfig {
    /// Create a configuration with defaults for everything but the path root.
    pub fn new(path_root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: String::new(),
            path_root: path_root.into(),
            dir: default_dir(),
            prune_delay_ms: default_prune_delay_ms(),
            max_age_days: default_max_age_days(),
            batch_size: default_batch_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            log: None,
            clock: None,
            quiet_stderr: false,
        }
    }

    /// Load a configuration in layers: defaults < TOML file < environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or an environment variable holds a value
    /// of the wrong type.
    pub fn load(path_root: impl Into<PathBuf>, file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::new(path_root)));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        let mut config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context("Failed to load cache configuration")?;

        config.apply_dir_override(std::env::var_os(CACHE_DIR_ENV));
        log::debug!("Loaded cache configuration: {:?}", config);
        Ok(config)
    }

    /// Apply a `CACHE_DIR`-style override, resolved against `path_root`.
    pub fn apply_dir_override(&mut self, value: Option<OsString>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.dir = self.path_root.join(value);
        }
    }

    /// Set the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the store directory.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set the trace sink.
    #[must_use]
    pub fn with_log<W: std::io::Write + Send + 'static>(mut self, writer: W) -> Self {
        self.log = Some(DiagnosticLog::new(writer));
        self
    }

    /// Set the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the delay before the prune run.
    #[must_use]
    pub fn with_prune_delay(mut self, delay: Duration) -> Self {
        self.prune_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the number of days an entry may go unused.
    #[must_use]
    pub fn with_max_age_days(mut self, days: u64) -> Self {
        self.max_age_days = days;
        self
    }

    /// Set the prune batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Stop mirroring store errors to stderr.
    #[must_use]
    pub fn with_quiet_stderr(mut self) -> Self {
        self.quiet_stderr = true;
        self
    }

    /// The prune delay as a [`Duration`].
    #[must_use]
    pub fn prune_delay(&self) -> Duration {
        Duration::from_millis(self.prune_delay_ms)
    }

    /// The expiry age as a [`Duration`].
    #[must_use]
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_days.saturating_mul(DAY_MS))
    }

    /// The busy timeout as a [`Duration`].
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
