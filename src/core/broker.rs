use crate::core::error;
use crate::core::pool::SqlitePool;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// The DB Broker is the "Thin Waist" for state access.
/// Every engine operation passes through it: writes are serialized per user
/// and wrapped in one transaction, and every call leaves one audit line.
pub struct DbBroker {
    pool: SqlitePool,
    audit_log_path: PathBuf,
    audit_lock: Mutex<()>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub intent_ref: Option<String>,
    pub op: String,
    pub db_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DbBroker {
    pub fn new(store: &Store) -> Self {
        Self {
            pool: SqlitePool::new(&store.db_path()),
            audit_log_path: store.audit_log_path(),
            audit_lock: Mutex::new(()),
        }
    }

    fn db_id(&self) -> String {
        self.pool
            .db_path()
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    /// Execute a per-user mutation atomically.
    pub fn with_user_tx<F, R>(
        &self,
        user_id: &str,
        intent_ref: Option<&str>,
        op_name: &str,
        f: F,
    ) -> Result<R, error::EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, error::EngineError>,
    {
        let result = self.pool.with_user_write(user_id, f);
        self.record_outcome(user_id, intent_ref, op_name, &result);
        result
    }

    /// Execute a catalog mutation atomically.
    pub fn with_catalog_tx<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, error::EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, error::EngineError>,
    {
        let result = self.pool.with_write(f);
        self.record_outcome(actor, None, op_name, &result);
        result
    }

    /// Execute a read-only closure.
    pub fn with_read<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, error::EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, error::EngineError>,
    {
        let result = self.pool.with_read(f);
        self.record_outcome(actor, None, op_name, &result);
        result
    }

    /// Audit the outcome of a call that already finished. The operation's own
    /// result always wins: a committed write stays `Ok` even when the audit
    /// line cannot be written.
    fn record_outcome<R>(
        &self,
        actor: &str,
        intent_ref: Option<&str>,
        op: &str,
        result: &Result<R, error::EngineError>,
    ) {
        let (status, detail) = match result {
            Ok(_) => ("success", None),
            Err(e) => ("error", Some(format!("{}: {}", e.kind(), e))),
        };
        self.log_event_best_effort(actor, intent_ref, op, status, detail);
    }

    /// Append one audit line; a failed write is reported on stderr instead of
    /// being returned. Also used directly for `degraded` outcomes (provider
    /// failures absorbed by a fallback).
    pub fn log_event_best_effort(
        &self,
        actor: &str,
        intent_ref: Option<&str>,
        op: &str,
        status: &str,
        detail: Option<String>,
    ) {
        if let Err(e) = self.log_event(actor, intent_ref, op, status, detail) {
            eprintln!(
                "warning: audit line for '{}' ({}) not written: {}",
                op, status, e
            );
        }
    }

    /// Append one line to the audit log.
    fn log_event(
        &self,
        actor: &str,
        intent_ref: Option<&str>,
        op: &str,
        status: &str,
        detail: Option<String>,
    ) -> Result<(), error::EngineError> {
        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            intent_ref: intent_ref.map(|s| s.to_string()),
            op: op.to_string(),
            db_id: self.db_id(),
            status: status.to_string(),
            detail,
        };
        let line = serde_json::to_string(&ev)?;

        let _guard = self.audit_lock.lock().map_err(|_| {
            error::EngineError::DatabaseInitializationError("audit log lock poisoned".to_string())
        })?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)
            .map_err(error::EngineError::IoError)?;
        writeln!(f, "{}", line).map_err(error::EngineError::IoError)?;
        Ok(())
    }

    /// Read back the audit log, optionally filtered by actor.
    pub fn read_audit(&self, actor: Option<&str>) -> Result<Vec<BrokerEvent>, error::EngineError> {
        if !self.audit_log_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.audit_log_path)?;
        let mut out = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let ev: BrokerEvent = serde_json::from_str(line)?;
            if actor.is_none_or(|a| ev.actor == a) {
                out.push(ev);
            }
        }
        Ok(out)
    }
}
