//! Input validation for rset
//!
//! Source, column and relationship names end up as SQL identifiers and as
//! words in the condition syntax. They are quoted when compiled, but must
//! still be parseable back out of a condition string.

use thiserror::Error;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': {1}")]
    InvalidIdentifier(String, &'static str),

    #[error("Identifier '{0}' is too long (max {1} characters)")]
    TooLong(String, usize),

    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Reserved name: '{0}'")]
    Reserved(String),
}

/// Maximum length for identifiers (PostgreSQL's NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Words the condition parser treats as keywords, plus the base alias
const RESERVED_NAMES: &[&str] = &[
    "and", "or", "not", "is", "null", "like", "in", "between", "true", "false", "asc", "desc", "me",
];

/// Validate a result source name
pub fn validate_source_name(name: &str) -> Result<(), ValidationError> {
    validate_identifier(name)
}

/// Validate a table or column name
pub fn validate_column_name(name: &str) -> Result<(), ValidationError> {
    validate_identifier(name)
}

/// Validate a relationship name (used as a join alias)
pub fn validate_relation_name(name: &str) -> Result<(), ValidationError> {
    validate_identifier(name)
}

/// Core identifier validation
///
/// Rules:
/// - 1-63 characters
/// - ASCII letters, digits and underscore only
/// - must start with a letter or underscore
/// - not a reserved word (case-insensitive)
fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(name.to_string(), MAX_IDENTIFIER_LENGTH));
    }

    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(ValidationError::InvalidIdentifier(
                name.to_string(),
                "contains invalid characters (only alphanumeric and underscore allowed)",
            ));
        }
        if i == 0 && c.is_ascii_digit() {
            return Err(ValidationError::InvalidIdentifier(
                name.to_string(),
                "cannot start with a digit",
            ));
        }
    }

    if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        return Err(ValidationError::Reserved(name.to_string()));
    }

    Ok(())
}
