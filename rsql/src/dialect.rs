//! SQL dialects
//!
//! Each database engine has its own placeholder style, identifier quoting
//! and LIMIT quirks. The compiler only talks to [`SqlDialect`].

use serde::{Deserialize, Serialize};

/// Differences between SQL engines that matter to the compiler
pub trait SqlDialect: Send + Sync {
    /// Dialect name
    fn name(&self) -> &'static str;

    /// Placeholder for the `n`-th bind parameter (1-based)
    fn placeholder(&self, n: usize) -> String;

    /// Character used to quote identifiers
    fn quote_char(&self) -> char {
        '"'
    }

    /// Quote an identifier (table, column, alias)
    fn quote_identifier(&self, name: &str) -> String {
        let q = self.quote_char();
        let escaped = name.replace(q, &format!("{}{}", q, q));
        format!("{}{}{}", q, escaped, q)
    }

    /// LIMIT value to use when only an OFFSET was requested, if the
    /// engine needs one
    fn unbounded_limit(&self) -> Option<&'static str> {
        None
    }

    /// Whether `INSERT ... RETURNING *` is available
    fn supports_returning(&self) -> bool {
        true
    }
}

// ─── PostgreSQL ──────────────────────────────────────────────────────────────

pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${}", n)
    }
}

// ─── SQLite ──────────────────────────────────────────────────────────────────

pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("-1")
    }
}

// ─── MySQL ───────────────────────────────────────────────────────────────────

pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("18446744073709551615")
    }

    fn supports_returning(&self) -> bool {
        false
    }
}

/// Serializable selector for the built-in dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    Sqlite,
    Mysql,
}

impl DialectKind {
    pub fn dialect(self) -> &'static dyn SqlDialect {
        match self {
            DialectKind::Postgres => &Postgres,
            DialectKind::Sqlite => &Sqlite,
            DialectKind::Mysql => &MySql,
        }
    }
}

impl std::str::FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "sqlite" => Ok(DialectKind::Sqlite),
            "mysql" | "mariadb" => Ok(DialectKind::Mysql),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}
