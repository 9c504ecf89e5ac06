use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Failed to initialize database: {0}")]
    DatabaseInitializationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient balance: requires {required} coins, {available} available")]
    InsufficientBalance { required: i64, available: i64 },
    #[error("External provider error: {0}")]
    ExternalProvider(String),
    #[error("Rate limit exceeded: retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },
}

impl EngineError {
    /// Stable machine-readable condition name for the boundary layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::ExternalProvider(_) => "external_provider_error",
            Self::RateLimitExceeded { .. } => "rate_limited",
            Self::RusqliteError(_)
            | Self::IoError(_)
            | Self::JsonError(_)
            | Self::ConfigError(_)
            | Self::DatabaseInitializationError(_) => "storage_error",
        }
    }

    /// True when SQLite rejected a write on a UNIQUE/CHECK constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::RusqliteError(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
