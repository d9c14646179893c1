//! Result source definitions
//!
//! A result source describes one table:
//! - Column definitions with types
//! - Required vs optional columns and defaults
//! - The primary key
//! - Relationships to other sources
//!
//! Sources are stored as `{schema_dir}/{Name}.yaml`

mod relationship;

pub use relationship::{JoinType, Relationship, RelationshipKind};

use crate::error::{Error, Result};
use crate::validation::{validate_column_name, validate_relation_name, validate_source_name};
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A column type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Int,
    Float,
    Bool,
}

impl ColumnType {
    /// Whether a (non-null) value can be stored in a column of this type
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::String, Value::String(_))
                | (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_) | Value::Int(_))
                | (ColumnType::Bool, Value::Bool(_))
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
        }
    }
}

/// Definition of a single column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    /// Whether the column must be present and non-null on insert
    #[serde(default)]
    pub required: bool,
    /// Storage assigns the next integer when the value is absent
    #[serde(default)]
    pub auto_increment: bool,
    /// Value used on insert when none is given
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// How strictly a row is checked against a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCheck {
    /// Full row: required columns must be present
    Insert,
    /// Partial row: only the given columns are checked
    Update,
}

/// Schema for one table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultSource {
    /// Source name, e.g. `Artist`
    pub name: String,
    /// Table name (defaults to the lowercased source name)
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl ResultSource {
    /// Create a new source with no columns
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            description: None,
            primary_key: Vec::new(),
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, def: ColumnDef) -> Self {
        self.columns.push(def);
        self
    }

    pub fn primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn relationship(mut self, rel: Relationship) -> Self {
        self.relationships.push(rel);
        self
    }

    pub fn table_name(&self) -> String {
        self.table.clone().unwrap_or_else(|| self.name.to_lowercase())
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_def(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn relationship_def(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// The auto-increment column, if any
    pub fn auto_increment_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.auto_increment)
            .map(|c| c.name.as_str())
    }

    /// The single primary key column, or an error naming the operation
    pub fn single_primary_key(&self, operation: &'static str) -> Result<&str> {
        match self.primary_key.as_slice() {
            [pk] => Ok(pk),
            _ => Err(Error::CompositeKeyUnsupported {
                source_name: self.name.clone(),
                operation,
            }),
        }
    }

    /// Validate names and internal consistency (not cross-source references)
    pub fn validate(&self) -> Result<()> {
        validate_source_name(&self.name)?;
        validate_column_name(&self.table_name())?;

        let invalid = |message: String| Error::InvalidSource {
            source_name: self.name.clone(),
            message,
        };

        if self.columns.is_empty() {
            return Err(invalid("no columns declared".into()));
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            validate_column_name(&col.name)?;
            if !seen.insert(col.name.as_str()) {
                return Err(invalid(format!("column '{}' declared twice", col.name)));
            }
            if col.auto_increment && col.column_type != ColumnType::Int {
                return Err(invalid(format!("auto_increment column '{}' must be int", col.name)));
            }
            if let Some(default) = &col.default {
                if !col.column_type.accepts(default) {
                    return Err(invalid(format!("default for '{}' is not {}", col.name, col.column_type.name())));
                }
            }
        }

        if self.primary_key.is_empty() {
            return Err(invalid("no primary key declared".into()));
        }
        for pk in &self.primary_key {
            if !self.has_column(pk) {
                return Err(invalid(format!("primary key column '{}' is not declared", pk)));
            }
        }

        let mut rel_names = HashSet::new();
        for rel in &self.relationships {
            validate_relation_name(&rel.name)?;
            if !rel_names.insert(rel.name.as_str()) {
                return Err(invalid(format!("relationship '{}' declared twice", rel.name)));
            }
        }

        Ok(())
    }

    /// Validate a row against this source
    pub fn validate_row(&self, row: &Row, check: RowCheck) -> Result<()> {
        for (column, value) in row.iter() {
            let def = self.column_def(column).ok_or_else(|| Error::UnknownColumn {
                source_name: self.name.clone(),
                column: column.to_string(),
            })?;
            if !def.column_type.accepts(value) {
                return Err(Error::TypeMismatch {
                    column: column.to_string(),
                    expected: def.column_type.name().to_string(),
                    actual: value.type_name().to_string(),
                });
            }
            if def.required && value.is_null() {
                return Err(Error::MissingRequiredColumn {
                    source_name: self.name.clone(),
                    column: column.to_string(),
                });
            }
        }

        if check == RowCheck::Insert {
            for def in self.columns.iter().filter(|c| c.required && !c.auto_increment) {
                if !row.contains(&def.name) && def.default.is_none() {
                    return Err(Error::MissingRequiredColumn {
                        source_name: self.name.clone(),
                        column: def.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Registry of all result sources
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    sources: HashMap<String, ResultSource>,
    /// Directory sources are persisted to, if any
    path: Option<PathBuf>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.yaml` source from a directory
    pub fn load(schema_dir: &Path) -> Result<Self> {
        let mut registry = Self {
            sources: HashMap::new(),
            path: Some(schema_dir.to_path_buf()),
        };

        if schema_dir.exists() {
            for entry in WalkDir::new(schema_dir)
                .min_depth(1)
                .max_depth(1)
                .follow_links(true)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| {
                    let path = e.path().unwrap_or(schema_dir).to_path_buf();
                    Error::FileReadError { path, source: e.into() }
                })?;
                let path = entry.path();
                if path.extension().map(|e| e == "yaml" || e == "yml").unwrap_or(false) {
                    let content = std::fs::read_to_string(path).map_err(|source| Error::FileReadError {
                        path: path.to_path_buf(),
                        source,
                    })?;
                    let source: ResultSource = serde_yaml::from_str(&content).map_err(|e| Error::YamlParseError {
                        message: format!("{}: {}", path.display(), e),
                    })?;
                    source.validate()?;
                    tracing::debug!(source = %source.name, path = %path.display(), "loaded result source");
                    if registry.sources.contains_key(&source.name) {
                        return Err(Error::SourceAlreadyExists { name: source.name });
                    }
                    registry.sources.insert(source.name.clone(), source);
                }
            }
        }

        registry.check_references()?;
        tracing::info!(count = registry.sources.len(), "schema loaded");
        Ok(registry)
    }

    /// Get a source by name
    pub fn get(&self, name: &str) -> Result<&ResultSource> {
        self.sources.get(name).ok_or_else(|| Error::SourceNotFound {
            name: name.to_string(),
        })
    }

    /// Register a source, persisting it when the registry has a directory
    pub fn register(&mut self, source: ResultSource) -> Result<()> {
        source.validate()?;
        if self.sources.contains_key(&source.name) {
            return Err(Error::SourceAlreadyExists { name: source.name });
        }

        if let Some(dir) = &self.path {
            std::fs::create_dir_all(dir).map_err(|source| Error::FileWriteError {
                path: dir.clone(),
                source,
            })?;
            let file_path = dir.join(format!("{}.yaml", source.name));
            let content = serde_yaml::to_string(&source).map_err(|e| Error::YamlSerializeError {
                message: e.to_string(),
            })?;
            std::fs::write(&file_path, content).map_err(|source| Error::FileWriteError {
                path: file_path.clone(),
                source,
            })?;
        }

        self.sources.insert(source.name.clone(), source);
        Ok(())
    }

    /// All sources, sorted by name
    pub fn list(&self) -> Vec<&ResultSource> {
        let mut sources: Vec<_> = self.sources.values().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    /// Resolve a relationship of `source` to its definition and target source
    pub fn relationship<'a>(
        &'a self,
        source: &'a ResultSource,
        name: &str,
    ) -> Result<(&'a Relationship, &'a ResultSource)> {
        let rel = source.relationship_def(name).ok_or_else(|| Error::UnknownRelation {
            source_name: source.name.clone(),
            relation: name.to_string(),
        })?;
        Ok((rel, self.get(&rel.source)?))
    }

    /// Check that every relationship points at an existing source and column
    pub fn check_references(&self) -> Result<()> {
        for source in self.sources.values() {
            for rel in &source.relationships {
                let target = self.sources.get(&rel.source).ok_or_else(|| Error::InvalidSource {
                    source_name: source.name.clone(),
                    message: format!("relationship '{}' targets unknown source '{}'", rel.name, rel.source),
                })?;
                let (child, parent) = match rel.kind {
                    RelationshipKind::BelongsTo => (source, target),
                    _ => (target, source),
                };
                if !child.has_column(&rel.foreign_key) {
                    return Err(Error::InvalidSource {
                        source_name: source.name.clone(),
                        message: format!(
                            "relationship '{}': '{}' has no column '{}'",
                            rel.name, child.name, rel.foreign_key
                        ),
                    });
                }
                parent.single_primary_key("relationship")?;
            }
        }
        Ok(())
    }
}
