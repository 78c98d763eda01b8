//! Logging setup for hosts embedding the cache.
//!
//! The cache itself only emits `log` records: `trace` for every store
//! operation, `debug` for store lifecycle and prune summaries, and `warn` for
//! absorbed store failures. Hosts without a logger of their own can call
//! [`init_logging`] to route those records through `env_logger`.
//!
//! Log levels are determined by (in priority order):
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. `quiet` (warnings and errors only) or `verbose` (debug/trace)
//! 3. Default: info level
//!
//! # Example
//!
//! ```rust,no_run
//! use transpile_cache::logging::init_logging;
//!
//! // Show every HIT/MISS/PUT line
//! init_logging(2, false);
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Install an `env_logger` backend.
///
/// Returns `false` if a logger was already installed, so calling this from
/// several tests or embedders is harmless.
///
/// # Arguments
///
/// * `verbose` - 0 = info, 1 = debug, 2+ = trace (store operations)
/// * `quiet` - only warnings and errors; overridden by `RUST_LOG`
pub fn init_logging(verbose: u8, quiet: bool) -> bool {
    let mut builder = Builder::new();

    if env::var_os("RUST_LOG").is_some() {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    builder.format(|buf, record| {
        let level = record.level();
        let level_style = buf.default_level_style(level);
        writeln!(
            buf,
            "{} {level_style}{:<5}{level_style:#} [{}] {}",
            buf.timestamp_millis(),
            level,
            record.target(),
            record.args()
        )
    });

    let installed = builder.try_init().is_ok();
    if installed {
        log::debug!("Logging initialized at level: {:?}", log::max_level());
    }
    installed
}

/// Determine the log level from verbosity flags.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Warn
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
