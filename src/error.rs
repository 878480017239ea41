//! Typed errors for value conversion and row/constraint loading.
//!
//! Plumbing code uses `anyhow` like the rest of the crate; these types exist so
//! that failures carry the column, chunk or table they belong to.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A value could not be converted between its backup encoding and the native
/// parameter type of its target column.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Cannot convert value '{value}' of column {column} ({type_name}): {reason}")]
    Conversion {
        column: String,
        type_name: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported type {type_name} (code {type_code}) for column {column}")]
    UnsupportedType {
        column: String,
        type_name: String,
        type_code: i32,
    },

    #[error("Type {type_name} of column {column} needs the {extension} driver extension: {reason}")]
    ExtensionUnavailable {
        column: String,
        type_name: String,
        extension: String,
        reason: String,
    },

    #[error("Column {column} ({type_name}) holds bytes that are not valid UTF-8")]
    Encoding {
        column: String,
        type_name: String,
        #[source]
        source: std::str::Utf8Error,
    },
}

/// Failure while streaming rows into, or emitting constraints for, a table.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to load row {row} of chunk {chunk} into {table}")]
    Row {
        table: String,
        chunk: String,
        row: u64,
        #[source]
        source: BoxError,
    },

    #[error("Failed to read rows of {table}")]
    Read {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to commit rows into {table}")]
    Commit {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to create {object} on {table}")]
    Constraint {
        table: String,
        object: String,
        #[source]
        source: BoxError,
    },

    #[error("Worker for {table} panicked: {reason}")]
    Panicked { table: String, reason: String },
}

impl LoadError {
    pub fn row(table: &str, chunk: &str, row: u64, source: impl Into<BoxError>) -> Self {
        LoadError::Row {
            table: table.to_string(),
            chunk: chunk.to_string(),
            row,
            source: source.into(),
        }
    }

    pub fn read(table: &str, source: impl Into<BoxError>) -> Self {
        LoadError::Read {
            table: table.to_string(),
            source: source.into(),
        }
    }

    pub fn commit(table: &str, source: impl Into<BoxError>) -> Self {
        LoadError::Commit {
            table: table.to_string(),
            source: source.into(),
        }
    }

    pub fn constraint(table: &str, object: &str, source: impl Into<BoxError>) -> Self {
        LoadError::Constraint {
            table: table.to_string(),
            object: object.to_string(),
            source: source.into(),
        }
    }
}
