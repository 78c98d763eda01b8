//! Diagnostic channel for store operations.
//!
//! Every store operation is reported three ways:
//!
//! 1. A `log` record (`trace` on success, `warn` on failure).
//! 2. An optional caller-supplied text sink, one line per operation:
//!    `"<OP>  [<namespace>]  <key>"` or `"ERROR/<OP>  [<namespace>]  <key>: <details>"`.
//! 3. Failures only: a line on stderr prefixed with `[transpile-cache]`,
//!    painted red when stderr is a terminal. This mirror is written whether or
//!    not a sink is configured.

use std::fmt;
use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex};

use yansi::Paint;

use crate::store::Namespace;

/// Fixed prefix for the stderr error mirror.
pub const STDERR_PREFIX: &str = "[transpile-cache]";

/// A shareable write-only text sink for trace lines.
#[derive(Clone)]
pub struct DiagnosticLog {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl DiagnosticLog {
    /// Wrap a writer as a diagnostic sink.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    fn write_line(&self, line: fmt::Arguments<'_>) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // A broken sink must not affect cache behavior.
        let _ = guard.write_fmt(line);
        let _ = guard.write_all(b"\n");
    }
}

impl fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DiagnosticLog(<sink>)")
    }
}

/// Where failure lines are mirrored.
#[derive(Debug, Clone)]
enum Mirror {
    Off,
    Stderr,
    Writer(DiagnosticLog),
}

/// Reporter used by the record layer.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    sink: Option<DiagnosticLog>,
    mirror: Mirror,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Diagnostics {
    /// Create a reporter with an optional sink. The stderr mirror is enabled.
    #[must_use]
    pub fn new(sink: Option<DiagnosticLog>) -> Self {
        Self {
            sink,
            mirror: Mirror::Stderr,
        }
    }

    /// Disable the stderr mirror (used by tests that inject faults on purpose).
    #[must_use]
    pub fn without_stderr(mut self) -> Self {
        self.mirror = Mirror::Off;
        self
    }

    /// Send mirrored failure lines to `writer` instead of stderr. Lines are
    /// written uncolored.
    #[must_use]
    pub fn with_mirror(mut self, writer: DiagnosticLog) -> Self {
        self.mirror = Mirror::Writer(writer);
        self
    }

    /// Record a successful operation.
    pub fn record(&self, op: &str, namespace: Namespace, key: &str) {
        log::trace!("{}  [{}]  {}", op, namespace, key);
        if let Some(ref sink) = self.sink {
            sink.write_line(format_args!("{}  [{}]  {}", op, namespace, key));
        }
    }

    /// Record a failed operation.
    pub fn error(&self, op: &str, namespace: Namespace, key: &str, err: &dyn fmt::Display) {
        log::warn!("{} error [{}/{}]: {}", op, namespace, key, err);
        if let Some(ref sink) = self.sink {
            sink.write_line(format_args!(
                "ERROR/{}  [{}]  {}: {}",
                op, namespace, key, err
            ));
        }
        let message = || {
            format!(
                "{} {} error [{}/{}]: {}",
                STDERR_PREFIX, op, namespace, key, err
            )
        };
        match self.mirror {
            Mirror::Off => {}
            Mirror::Stderr => {
                let mut stderr = std::io::stderr();
                let _ = if stderr.is_terminal() {
                    writeln!(stderr, "{}", message().red())
                } else {
                    writeln!(stderr, "{}", message())
                };
            }
            Mirror::Writer(ref writer) => writer.write_line(format_args!("{}", message())),
        }
    }
}
