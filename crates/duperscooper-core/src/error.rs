use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Required tool '{tool}' not found on PATH: {hint}")]
    ToolMissing {
        tool: &'static str,
        hint: &'static str,
    },

    #[error("Failed to fingerprint {path}: {source}")]
    Fingerprint {
        path: PathBuf,
        source: crate::hasher::FingerprintError,
    },

    #[error("Invalid scan result: {0}")]
    ScanResult(String),

    #[error("Rule validation failed: {0}")]
    Rules(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Staging batch not found: {0}")]
    BatchNotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
