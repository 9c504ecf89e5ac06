//! Subsystem registration: centralizes every store initialization step.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::{db, error, schemas, time};
use crate::plugins::catalog;
use std::path::Path;

pub(crate) struct SubsystemInit {
    pub name: &'static str,
    pub initialize: fn(&Path) -> Result<(), error::EngineError>,
}

fn initialize_schema(root: &Path) -> Result<(), error::EngineError> {
    db::initialize_engine_db(root).map(|_| ())
}

fn seed_catalog(root: &Path) -> Result<(), error::EngineError> {
    let conn = db::db_connect(&root.join(schemas::ENGINE_DB_NAME).to_string_lossy())?;
    let tx = conn.unchecked_transaction()?;
    catalog::seed_default_catalog(&tx, &time::now_epoch_z())?;
    tx.commit()?;
    Ok(())
}

/// Order matters: the catalog seed needs the schema.
pub(crate) const SUBSYSTEMS: &[SubsystemInit] = &[
    SubsystemInit { name: "schema", initialize: initialize_schema },
    SubsystemInit { name: "catalog", initialize: seed_catalog },
];

/// Initialize the store sequentially. Safe to run on every start.
pub(crate) fn initialize_all(data_root: &Path) -> Result<(), error::EngineError> {
    for sub in SUBSYSTEMS {
        (sub.initialize)(data_root).map_err(|e| match e {
            error::EngineError::DatabaseInitializationError(msg) => {
                error::EngineError::DatabaseInitializationError(format!("{}: {}", sub.name, msg))
            }
            other => other,
        })?;
    }
    Ok(())
}
