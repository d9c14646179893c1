//! Error types for rset
//!
//! Provides structured error types with context for better debugging
//! and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for rset operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Schema Errors
    // ==========================================================================
    #[error("Result source '{name}' does not exist")]
    SourceNotFound { name: String },

    #[error("Result source '{name}' is already registered")]
    SourceAlreadyExists { name: String },

    #[error("Invalid result source '{source_name}': {message}")]
    InvalidSource { source_name: String, message: String },

    #[error("Column '{column}' does not exist on '{source_name}'")]
    UnknownColumn { source_name: String, column: String },

    #[error("Relationship '{relation}' does not exist on '{source_name}'")]
    UnknownRelation { source_name: String, relation: String },

    #[error("Relationship '{relation}' is referenced but not joined")]
    RelationNotJoined { relation: String },

    // ==========================================================================
    // Row Errors
    // ==========================================================================
    #[error("Missing required column '{column}' for '{source_name}'")]
    MissingRequiredColumn { source_name: String, column: String },

    #[error("Type mismatch for column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Primary key of '{source_name}' has {expected} column(s), {actual} value(s) given")]
    PrimaryKeyArity {
        source_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("{operation} on '{source_name}' needs a single-column primary key")]
    CompositeKeyUnsupported {
        source_name: String,
        operation: &'static str,
    },

    #[error("Duplicate primary key {key} in table '{table}'")]
    DuplicateKey { table: String, key: String },

    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Reserved name '{name}' cannot be used")]
    ReservedName { name: String },

    // ==========================================================================
    // Query Errors
    // ==========================================================================
    #[error("Condition parse error: {message}")]
    ParseError { message: String },

    #[error("Query compile error: {message}")]
    CompileError { message: String },

    #[error("Parameter binding error: {message}")]
    BindError { message: String },

    #[error("Query returned more than one row where at most one was expected")]
    MultipleRows,

    #[error("Page {page} of {rows} rows starts beyond the largest possible offset")]
    PageOutOfRange { page: u64, rows: u64 },

    #[error("Query execution error: {message}")]
    QueryError { message: String },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    #[error("Table '{table}' does not exist in storage")]
    TableNotFound { table: String },

    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==========================================================================
    // Serialization Errors
    // ==========================================================================
    #[error("Failed to parse YAML: {message}")]
    YamlParseError { message: String },

    #[error("Failed to serialize to YAML: {message}")]
    YamlSerializeError { message: String },

    // ==========================================================================
    // Config Errors
    // ==========================================================================
    #[error("Invalid configuration: {message}")]
    ConfigError { message: String },
}

/// Result type alias for rset operations
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            message: err.to_string(),
        }
    }
}

impl From<rsql::ParseError> for Error {
    fn from(err: rsql::ParseError) -> Self {
        Error::ParseError {
            message: err.to_string(),
        }
    }
}

impl From<rsql::CompileError> for Error {
    fn from(err: rsql::CompileError) -> Self {
        Error::CompileError {
            message: err.to_string(),
        }
    }
}

impl From<rsql::BindError> for Error {
    fn from(err: rsql::BindError) -> Self {
        Error::BindError {
            message: err.to_string(),
        }
    }
}

impl From<crate::validation::ValidationError> for Error {
    fn from(err: crate::validation::ValidationError) -> Self {
        match err {
            crate::validation::ValidationError::InvalidIdentifier(value, reason) => {
                Error::InvalidIdentifier {
                    kind: "identifier",
                    value,
                    reason,
                }
            }
            crate::validation::ValidationError::TooLong(value, _max) => Error::InvalidIdentifier {
                kind: "identifier",
                value,
                reason: "exceeds maximum length",
            },
            crate::validation::ValidationError::Empty => Error::InvalidIdentifier {
                kind: "identifier",
                value: String::new(),
                reason: "cannot be empty",
            },
            crate::validation::ValidationError::Reserved(name) => Error::ReservedName { name },
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::SourceNotFound { .. } => {
                Some("Check the schema directory; each source needs a <Name>.yaml file")
            }
            Error::RelationNotJoined { .. } => {
                Some("Add the relationship with .join(\"name\") or --join name before referencing its columns")
            }
            Error::UnknownColumn { .. } => Some("Run `rset sources` to list the declared columns"),
            Error::InvalidIdentifier { .. } => {
                Some("Use only letters, numbers and underscores, starting with a letter")
            }
            Error::MissingRequiredColumn { .. } => Some("Supply a value for every required column"),
            Error::BindError { .. } => Some("Pass exactly one parameter per `?` in the condition"),
            _ => None,
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::SourceNotFound { .. }
                | Error::UnknownColumn { .. }
                | Error::UnknownRelation { .. }
                | Error::RelationNotJoined { .. }
                | Error::InvalidIdentifier { .. }
                | Error::ParseError { .. }
                | Error::BindError { .. }
        )
    }
}
