//! SQLite-backed record environment.
//!
//! One database file holds the four namespaces as separate tables. The file
//! is opened in WAL mode so readers never block the writer, and with a busy
//! timeout so parallel build workers sharing the directory queue for the
//! write lock instead of failing.
//!
//! The layout is not versioned. A file SQLite reports as corrupt or not a
//! database is deleted and recreated when the environment is opened.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{Backend, Namespace, ScanIter};
use crate::error::{CacheError, StoreError};

/// File name of the environment inside the cache directory.
pub const DB_FILE_NAME: &str = "transpile-cache.sqlite";

/// Default time a connection waits for a lock held by another process.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of records fetched per page during a scan.
const SCAN_PAGE_SIZE: usize = 256;

/// The on-disk environment owning all four namespaces.
pub struct SqliteEnvironment {
    path: PathBuf,
    reader: Mutex<Connection>,
    writer: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEnvironment")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteEnvironment {
    /// Opens or creates the environment in `dir` with the default busy timeout.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        Self::open_with_timeout(dir, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens or creates the environment in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::CreateDir`] if `dir` cannot be created, and
    /// [`CacheError::Open`] if the database cannot be opened even after
    /// discarding a corrupt file.
    pub fn open_with_timeout(dir: &Path, busy_timeout: Duration) -> Result<Self, CacheError> {
        fs::create_dir_all(dir).map_err(|source| CacheError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(DB_FILE_NAME);

        let writer = match open_connection(&path, busy_timeout, true) {
            Ok(conn) => conn,
            Err(e) if is_corruption(&e) => {
                log::warn!(
                    "Cache store at {} is corrupt, rebuilding: {}",
                    path.display(),
                    e
                );
                discard_files(&path);
                open_connection(&path, busy_timeout, true).map_err(|source| CacheError::Open {
                    path: path.clone(),
                    source,
                })?
            }
            Err(source) => return Err(CacheError::Open { path, source }),
        };

        let reader = open_connection(&path, busy_timeout, false).map_err(|source| {
            CacheError::Open {
                path: path.clone(),
                source,
            }
        })?;

        log::debug!("Opened cache store at {}", path.display());

        Ok(Self {
            path,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in a namespace.
    pub fn len(&self, namespace: Namespace) -> Result<usize, StoreError> {
        let conn = self.reader();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", namespace.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Returns `true` if the namespace holds no records.
    pub fn is_empty(&self, namespace: Namespace) -> Result<bool, StoreError> {
        Ok(self.len(namespace)? == 0)
    }

    fn reader(&self) -> MutexGuard<'_, Connection> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fetch_page(
        &self,
        namespace: Namespace,
        after: Option<&str>,
        upper: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.reader();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT key, value FROM \"{}\" WHERE (?1 IS NULL OR key > ?1) AND key <= ?2 ORDER BY key LIMIT ?3",
            namespace.name()
        ))?;
        let rows = stmt.query_map(params![after, upper, SCAN_PAGE_SIZE as i64], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        let page = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(page)
    }
}

impl Backend for SqliteEnvironment {
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.reader();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT value FROM \"{}\" WHERE key = ?1",
            namespace.name()
        ))?;
        let value = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    fn put(&self, namespace: Namespace, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.writer();
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT OR REPLACE INTO \"{}\" (key, value) VALUES (?1, ?2)",
            namespace.name()
        ))?;
        stmt.execute(params![key, value])?;
        Ok(())
    }

    fn remove(&self, namespace: Namespace, key: &str) -> Result<bool, StoreError> {
        let conn = self.writer();
        let mut stmt = conn.prepare_cached(&format!(
            "DELETE FROM \"{}\" WHERE key = ?1",
            namespace.name()
        ))?;
        let changed = stmt.execute(params![key])?;
        Ok(changed > 0)
    }

    fn range(&self, namespace: Namespace) -> Result<ScanIter<'_>, StoreError> {
        let upper: Option<String> = self.reader().query_row(
            &format!("SELECT MAX(key) FROM \"{}\"", namespace.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(Box::new(Scan {
            env: self,
            namespace,
            upper,
            after: None,
            page: VecDeque::new(),
            done: false,
        }))
    }
}

/// Keyset-paginated scan; the reader lock is held only while a page loads.
struct Scan<'a> {
    env: &'a SqliteEnvironment,
    namespace: Namespace,
    upper: Option<String>,
    after: Option<String>,
    page: VecDeque<(String, String)>,
    done: bool,
}

impl Iterator for Scan<'_> {
    type Item = Result<(String, String), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.done {
            let Some(upper) = self.upper.as_deref() else {
                self.done = true;
                return None;
            };
            match self
                .env
                .fetch_page(self.namespace, self.after.as_deref(), upper)
            {
                Ok(page) => {
                    if page.len() < SCAN_PAGE_SIZE {
                        self.done = true;
                    }
                    if let Some((last, _)) = page.last() {
                        self.after = Some(last.clone());
                    }
                    self.page.extend(page);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.page.pop_front().map(Ok)
    }
}

fn open_connection(
    path: &Path,
    busy_timeout: Duration,
    create_schema: bool,
) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    if create_schema {
        for namespace in Namespace::ALL {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL) WITHOUT ROWID;",
                namespace.name()
            ))?;
        }
    }

    Ok(conn)
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt)
    )
}

fn discard_files(path: &Path) {
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");
    let mut shm = path.as_os_str().to_owned();
    shm.push("-shm");

    for file in [path.to_path_buf(), PathBuf::from(wal), PathBuf::from(shm)] {
        if let Err(e) = fs::remove_file(&file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {}", file.display(), e);
            }
        }
    }
}
