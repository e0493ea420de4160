//! Error types for the SQLite backend.
//!
//! Provides a unified error type covering database access, schema
//! registration, migration, query compilation, lookups and value encoding.

use microlite_core::{QueryError, SchemaError, ValueError};
use thiserror::Error;

use crate::migration::MigrationError;

/// Errors that can occur while working with a microlite database.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Declared schema is invalid.
    #[error("schema error: {0}")]
    SchemaError(#[from] SchemaError),

    /// Declared and live schema could not be reconciled.
    #[error("migration error: {0}")]
    MigrationError(#[from] MigrationError),

    /// Query expression could not be compiled.
    #[error("query error: {0}")]
    QueryError(#[from] QueryError),

    /// A row expected to exist was not found.
    #[error("lookup error: {0}")]
    LookupError(String),

    /// A value could not be bound to a column.
    #[error("parameter error: {0}")]
    ParameterError(String),

    /// A stored value could not be decoded or extracted.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// File I/O failure while reading or writing configuration.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl From<ValueError> for SqliteError {
    fn from(err: ValueError) -> Self {
        SqliteError::ConversionError(err.to_string())
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
