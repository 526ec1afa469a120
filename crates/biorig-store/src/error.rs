//! Error types for biorig-store.

use std::path::PathBuf;

/// Result type for biorig-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in biorig-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored control-parameter row failed validation.
    #[error(transparent)]
    InvalidParameters(#[from] biorig_types::Error),

    /// CSV export error.
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
