//! rsql - query specifications and their SQL rendering
//!
//! The pure half of rset: immutable query specifications, a parser for the
//! textual condition syntax, and a compiler that renders specifications to
//! dialect-specific SQL with ordered bind values. Nothing here performs I/O.
//!
//! # Condition Syntax
//!
//! ```text
//! year > 1990 AND title LIKE 'P%'
//! artist.name IN ('Blur', 'Pulp') OR rank IS NULL
//! NOT (year BETWEEN ? AND ?)
//! ```
//!
//! - `col` refers to the resultset's own source (alias `me`)
//! - `rel.col` refers to a joined relationship
//! - `?` is a positional parameter, bound before compilation

mod ast;
mod compiler;
mod dialect;
mod error;
mod parser;

pub use ast::*;
pub use compiler::{
    compile_count, compile_delete, compile_insert, compile_select, compile_update, CompiledQuery,
};
pub use dialect::{DialectKind, MySql, Postgres, SqlDialect, Sqlite};
pub use error::{CompileError, ParseError};

/// Parse a condition string into an expression
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    parser::parse_condition(input)
}

/// Parse an ORDER BY list such as `name DESC, year`
pub fn parse_order_by(input: &str) -> Result<Vec<OrderBy>, ParseError> {
    parser::parse_order_by(input)
}

/// Parse a comma separated column list
pub fn parse_columns(input: &str) -> Result<Vec<ColumnRef>, ParseError> {
    parser::parse_columns(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_then_compile() {
        let mut spec = SelectSpec::new("album");
        spec.where_clause = Some(parse("title = ? AND year < 2000").unwrap().bind_params(&["Parklife".into()]).unwrap());
        let q = compile_select(&spec, DialectKind::Sqlite.dialect()).unwrap();
        assert_eq!(
            q.sql,
            "SELECT * FROM \"album\" \"me\" WHERE \"me\".\"title\" = ? AND \"me\".\"year\" < ?"
        );
        assert_eq!(q.binds, vec![Literal::String("Parklife".into()), Literal::Int(2000)]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("a = ").is_err());
        assert!(parse_order_by("").is_err());
    }
}
