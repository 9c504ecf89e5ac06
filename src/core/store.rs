//! Store abstraction for the engine's on-disk state.
//!
//! A store is a directory holding the SQLite database, the broker audit log
//! and the optional `lifescore.toml` config. Nothing outside the store root is
//! ever written.

use crate::core::schemas;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no explicit root is given.
pub const ROOT_ENV_VAR: &str = "LIFESCORE_ROOT";
/// Default store directory, relative to the working directory.
pub const DEFAULT_ROOT_DIR: &str = ".lifescore";

/// Store handle representing one engine data root.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute or working-directory-relative path to the store root
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the store root: explicit flag, then `LIFESCORE_ROOT`, then `./.lifescore`.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        if let Some(p) = explicit {
            return Self::new(p);
        }
        match env::var(ROOT_ENV_VAR) {
            Ok(v) if !v.trim().is_empty() => Self::new(v.trim()),
            _ => Self::new(DEFAULT_ROOT_DIR),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(schemas::ENGINE_DB_NAME)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.root.join(schemas::AUDIT_LOG_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(schemas::CONFIG_FILE_NAME)
    }
}
