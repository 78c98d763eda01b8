//! transpile-cache - Persistent Transpilation Cache
//!
//! A disk-backed key/value store that memoizes the output of a source-to-source
//! compilation step (transformed code plus source map) so repeated builds across
//! process restarts and parallel jobs skip redundant recompilation.
//!
//! Records live in four namespaces (`codes`, `atimes`, `mtimes`, `sourceMaps`)
//! of a single SQLite environment. Entries that have not been used for 30 days
//! are pruned by a one-shot background pass scheduled 30 minutes after the
//! cache is created.

pub mod cache;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod key;
pub mod logging;
pub mod prune;
pub mod store;

pub use cache::{Cache, CacheFile};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CacheConfig;
pub use error::{CacheError, DecodeError, StoreError};
pub use prune::{PruneReport, Pruner};
pub use store::{Backend, Namespace, SqliteEnvironment};
