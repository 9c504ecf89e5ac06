use crate::core::error;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Open a connection with the engine's standard pragmas.
pub fn db_connect(db_path: &str) -> Result<Connection, error::EngineError> {
    db_connect_with_timeout(db_path, 5)
}

pub fn db_connect_with_timeout(
    db_path: &str,
    busy_timeout_secs: u64,
) -> Result<Connection, error::EngineError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(busy_timeout_secs))
        .map_err(error::EngineError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::EngineError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::EngineError::RusqliteError)?;
    Ok(conn)
}

/// Create the store directory and apply every schema statement. Idempotent.
pub fn initialize_engine_db(root: &Path) -> Result<Connection, error::EngineError> {
    fs::create_dir_all(root).map_err(|e| {
        error::EngineError::DatabaseInitializationError(format!(
            "cannot create store root {}: {}",
            root.display(),
            e
        ))
    })?;
    let db_path = root.join(schemas::ENGINE_DB_NAME);
    let conn = db_connect(&db_path.to_string_lossy())?;

    for stmt in schemas::ENGINE_SCHEMA {
        conn.execute(stmt, [])?;
    }
    conn.execute_batch(schemas::SCHEMA_APPEND_ONLY_TRIGGERS)?;
    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![schemas::ENGINE_SCHEMA_VERSION.to_string()],
    )?;
    Ok(conn)
}

pub fn schema_version(conn: &Connection) -> Result<Option<u32>, error::EngineError> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(v.and_then(|s| s.parse().ok()))
}
