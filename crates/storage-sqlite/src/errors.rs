//! Storage error types and their mapping into the core taxonomy.

use thiserror::Error;

/// Errors produced by the SQLite storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Query execution failed
    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    /// Establishing a connection failed
    #[error("Database connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    /// Connection pool exhausted or unavailable
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Filesystem operation failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for fieldsync_core::Error {
    fn from(value: StorageError) -> Self {
        fieldsync_core::Error::persistence(value.to_string())
    }
}
