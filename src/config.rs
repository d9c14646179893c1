//! Repository configuration
//!
//! Loaded from `rset.yaml` at the repository root. Every field has a
//! default, so a missing file is the same as an empty one. A few fields
//! can be overridden from the environment:
//!
//! - `RSET_DIALECT`
//! - `RSET_TRACE_SQL`
//! - `RSET_DATA_DIR`
//! - `RSET_SCHEMA_DIR`

use crate::error::{Error, Result};
use rsql::DialectKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "rset.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding one `<Source>.yaml` per result source
    pub schema_dir: PathBuf,
    /// Directory holding one `<table>.yaml` per table
    pub data_dir: PathBuf,
    /// Dialect used when rendering SQL
    pub dialect: DialectKind,
    /// Log every executed statement at INFO instead of DEBUG
    pub trace_sql: bool,
    /// Rows per page when `page()` is used without `rows()`
    pub default_rows: u64,
    /// Fetch cursor rows in windows of this size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_batch_size: Option<u64>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_dir: PathBuf::from("schema"),
            data_dir: PathBuf::from("data"),
            dialect: DialectKind::default(),
            trace_sql: false,
            default_rows: 10,
            cursor_batch_size: None,
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Config rooted at `root` with default settings
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Load config from a file; a missing file yields the defaults rooted
    /// at the file's directory. Environment overrides are applied last.
    pub fn load(path: &Path) -> Result<Self> {
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| Error::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
            serde_yaml::from_str::<Config>(&content).map_err(|e| Error::ConfigError {
                message: format!("{}: {}", path.display(), e),
            })?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };
        config.root = root;

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config to `<root>/rset.yaml`
    pub fn save(&self) -> Result<()> {
        let path = self.root.join(CONFIG_FILE);
        let content = serde_yaml::to_string(self).map_err(|e| Error::YamlSerializeError {
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|source| Error::FileWriteError { path, source })
    }

    pub fn schema_path(&self) -> PathBuf {
        self.root.join(&self.schema_dir)
    }

    pub fn data_path(&self) -> PathBuf {
        self.root.join(&self.data_dir)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dialect) = var("RSET_DIALECT") {
            self.dialect = dialect
                .parse()
                .map_err(|message| Error::ConfigError { message })?;
        }
        if let Some(trace) = var("RSET_TRACE_SQL") {
            self.trace_sql = matches!(trace.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(dir) = var("RSET_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("RSET_SCHEMA_DIR") {
            self.schema_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.default_rows == 0 {
            return Err(Error::ConfigError {
                message: "default_rows must be at least 1".into(),
            });
        }
        if self.cursor_batch_size == Some(0) {
            return Err(Error::ConfigError {
                message: "cursor_batch_size must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::load(&tmp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.default_rows, 10);
        assert_eq!(config.schema_path(), tmp.path().join("schema"));
    }

    #[test]
    fn test_partial_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        std::fs::write(&path, "dialect: sqlite\ndefault_rows: 25\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.dialect, DialectKind::Sqlite);
        assert_eq!(config.default_rows, 25);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("RSET_DIALECT", "mysql"), ("RSET_TRACE_SQL", "true")].into();
        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.dialect, DialectKind::Mysql);
        assert!(config.trace_sql);

        let bad: HashMap<&str, &str> = [("RSET_DIALECT", "oracle")].into();
        assert!(config.apply_env(|k| bad.get(k).map(|v| v.to_string())).is_err());
    }

    #[test]
    fn test_save_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::at(tmp.path());
        config.cursor_batch_size = Some(100);
        config.save().unwrap();

        let loaded = Config::load(&tmp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(loaded.cursor_batch_size, Some(100));
    }

    #[test]
    fn test_rejects_zero_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        std::fs::write(&path, "default_rows: 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::ConfigError { .. })));
    }
}
