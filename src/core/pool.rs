//! SQLite connection handling with per-user write serialization and retry logic.
//!
//! - Maintains a **write mutex per user** so compound operations for one user
//!   (start/complete, credit/debit, history, achievements) never interleave.
//! - Every write runs inside one `BEGIN IMMEDIATE` transaction: it either
//!   commits as a whole or rolls back as a whole.
//! - Creates fresh **read connections** per operation (no mutex, concurrent via WAL).
//!
//! Connections are NOT pooled (opened fresh each time) so several engine
//! instances and processes can share one database file.

use crate::core::db;
use crate::core::error::EngineError;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Maximum retry attempts for busy/locked errors.
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 50;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 2_000;

/// Write connection busy_timeout in seconds.
const WRITE_BUSY_TIMEOUT_SECS: u64 = 10;
/// Read connection busy_timeout in seconds.
const READ_BUSY_TIMEOUT_SECS: u64 = 5;

/// Connection handle for one engine database.
///
/// Owned by the engine (no process-wide instance); clone the `Arc` that
/// wraps it to share between threads.
pub struct SqlitePool {
    db_path: PathBuf,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SqlitePool {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn user_lock(&self, user_id: &str) -> Result<Arc<Mutex<()>>, EngineError> {
        let mut locks = self.user_locks.lock().map_err(|_| {
            EngineError::DatabaseInitializationError("user lock table poisoned".to_string())
        })?;
        Ok(Arc::clone(
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    /// Drop the user's entry once nobody else holds or waits on it, so the
    /// table only ever holds users with a write in flight.
    fn release_user_lock(&self, user_id: &str, lock: &Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.user_locks.lock() {
            // One reference in the table plus the caller's.
            let idle = locks
                .get(user_id)
                .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) == 2);
            if idle {
                locks.remove(user_id);
            }
        }
    }

    /// Run `f` inside one immediate transaction while holding the user's write lock.
    /// Any error from `f` rolls back every write it made.
    pub fn with_user_write<F, R>(&self, user_id: &str, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, EngineError>,
    {
        let lock = self.user_lock(user_id)?;
        let result = match lock.lock() {
            Ok(_guard) => self.in_immediate_tx(f),
            Err(_) => Err(EngineError::DatabaseInitializationError(format!(
                "write lock for user '{}' poisoned",
                user_id
            ))),
        };
        self.release_user_lock(user_id, &lock);
        result
    }

    /// Run `f` with a catalog-level write transaction (no user lock).
    pub fn with_write<F, R>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, EngineError>,
    {
        self.in_immediate_tx(f)
    }

    fn in_immediate_tx<F, R>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, EngineError>,
    {
        let conn = db::db_connect_with_timeout(&self.db_path.to_string_lossy(), WRITE_BUSY_TIMEOUT_SECS)?;
        retry_on_busy(|| {
            conn.execute_batch("BEGIN IMMEDIATE;")
                .map_err(EngineError::RusqliteError)
        })?;

        match f(&conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    /// Execute a closure with a read connection (no mutex serialization).
    /// WAL mode allows concurrent readers across threads and processes.
    pub fn with_read<F, R>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, EngineError>,
    {
        let conn = db::db_connect_with_timeout(&self.db_path.to_string_lossy(), READ_BUSY_TIMEOUT_SECS)?;
        f(&conn)
    }
}

/// Retry a closure on `SQLITE_BUSY` / `DatabaseBusy` with exponential backoff.
fn retry_on_busy<F, R>(mut f: F) -> Result<R, EngineError>
where
    F: FnMut() -> Result<R, EngineError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy_error(&e) && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Check if an error is a SQLite busy/locked error that is retryable.
fn is_busy_error(err: &EngineError) -> bool {
    match err {
        EngineError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}
