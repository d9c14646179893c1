//! Error types for condition parsing and SQL compilation

use std::fmt;

/// Error that occurred during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the original input
    pub position: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn with_position(mut self, pos: usize) -> Self {
        self.position = Some(pos);
        self
    }

    /// Build an error from a nom failure, locating it within `original`
    pub(crate) fn from_nom(original: &str, err: nom::Err<nom::error::Error<&str>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => ParseError::new("Incomplete input"),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                let pos = original.len() - e.input.len();
                ParseError::new(format!(
                    "unexpected input near {:?}",
                    e.input.chars().take(20).collect::<String>()
                ))
                .with_position(pos)
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: {}", self.message)?;
        if let Some(pos) = self.position {
            write!(f, " at position {}", pos)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Error raised while rendering a specification to SQL
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("placeholder #{0} has no bound value")]
    UnboundParameter(usize),

    #[error("{0} requires at least one column")]
    EmptyColumnList(&'static str),

    #[error("INSERT has {columns} columns but {values} values")]
    ValueCountMismatch { columns: usize, values: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_position() {
        let err = ParseError::new("boom").with_position(7);
        assert_eq!(err.to_string(), "Parse error: boom at position 7");
    }

    #[test]
    fn test_compile_error_display() {
        assert_eq!(
            CompileError::UnboundParameter(2).to_string(),
            "placeholder #2 has no bound value"
        );
    }
}
