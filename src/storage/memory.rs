//! In-memory storage engine
//!
//! Tables live in memory and are evaluated directly from the query
//! specifications. With a data directory each table is persisted as
//! `<table>.yaml`, a sequence of column mappings, on [`Storage::flush`].

use super::eval::{lookup, Evaluator, Scope};
use super::Storage;
use crate::error::{Error, Result};
use crate::schema::{ResultSource, SchemaRegistry};
use crate::value::{Row, Value};
use async_trait::async_trait;
use rsql::{DeleteSpec, InsertSpec, JoinKind, OrderDirection, SelectItem, SelectSpec, UpdateSpec, BASE_ALIAS};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::RwLock;

type Tables = HashMap<String, Table>;

/// A stored table and the column metadata the engine enforces
#[derive(Debug, Clone)]
struct Table {
    name: String,
    columns: Vec<String>,
    primary_key: Vec<String>,
    auto_increment: Option<String>,
    defaults: HashMap<String, Value>,
    rows: Vec<Row>,
}

impl Table {
    fn from_source(source: &ResultSource) -> Self {
        Self {
            name: source.table_name(),
            columns: source.column_names().map(str::to_string).collect(),
            primary_key: source.primary_key.clone(),
            auto_increment: source.auto_increment_column().map(str::to_string),
            defaults: source
                .columns
                .iter()
                .filter_map(|c| c.default.clone().map(|d| (c.name.clone(), d)))
                .collect(),
            rows: Vec::new(),
        }
    }

    fn unknown_column(&self, column: &str) -> Error {
        Error::UnknownColumn {
            source_name: self.name.clone(),
            column: column.to_string(),
        }
    }

    /// Reorder a row into declared column order, filling gaps
    fn normalize(&self, row: Row, fill: impl Fn(&str) -> Value) -> Result<Row> {
        if let Some(column) = row.columns().find(|c| !self.columns.iter().any(|d| d.as_str() == *c)) {
            return Err(self.unknown_column(column));
        }
        Ok(self
            .columns
            .iter()
            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or_else(|| fill(c))))
            .collect())
    }

    /// Hashable primary key of a row, `None` when any part is null
    fn key(&self, row: &Row) -> Option<Vec<KeyPart>> {
        self.primary_key
            .iter()
            .map(|c| match row.get(c) {
                None | Some(Value::Null) => None,
                Some(Value::Bool(b)) => Some(KeyPart::Bool(*b)),
                Some(Value::Int(i)) => Some(KeyPart::Int(*i)),
                Some(Value::Float(f)) => Some(KeyPart::Float((f + 0.0).to_bits())),
                Some(Value::String(s)) => Some(KeyPart::String(s.clone())),
            })
            .collect()
    }

    /// Check primary keys of `rows` are non-null and unique
    fn check_keys<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> Result<()> {
        let mut seen: HashSet<Vec<KeyPart>> = HashSet::new();
        for row in rows {
            let key = self.key(row).ok_or_else(|| Error::QueryError {
                message: format!("primary key of '{}' cannot be null", self.name),
            })?;
            if !seen.insert(key) {
                let shown: Vec<String> = self
                    .primary_key
                    .iter()
                    .map(|c| row.get(c).map(Value::to_string).unwrap_or_default())
                    .collect();
                return Err(Error::DuplicateKey {
                    table: self.name.clone(),
                    key: format!("({})", shown.join(", ")),
                });
            }
        }
        Ok(())
    }

    fn next_id(&self, column: &str) -> Result<i64> {
        let max = self
            .rows
            .iter()
            .filter_map(|r| r.get(column).and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        max.checked_add(1).ok_or_else(|| Error::QueryError {
            message: format!("'{}.{}' has no value left after {}", self.name, column, max),
        })
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum KeyPart {
    Bool(bool),
    Int(i64),
    Float(u64),
    String(String),
}

fn table<'a>(tables: &'a Tables, name: &str) -> Result<&'a Table> {
    tables.get(name).ok_or_else(|| Error::TableNotFound {
        table: name.to_string(),
    })
}

/// Evaluate a select against the tables
fn run_select(tables: &Tables, spec: &SelectSpec) -> Result<Vec<Row>> {
    let base = table(tables, &spec.from.table)?;
    let subquery = |q: &SelectSpec| run_select(tables, q);

    let mut ev = Evaluator::new();
    let condition = spec
        .where_clause
        .as_ref()
        .map(|w| ev.prepare(w, &subquery))
        .transpose()?;

    let mut scopes: Vec<Scope<'_>> = base
        .rows
        .iter()
        .map(|row| vec![(spec.from.alias.as_str(), Some(row))])
        .collect();

    for join in &spec.joins {
        let target = table(tables, &join.table)?;
        let mut joined = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let mut matched = false;
            for row in &target.rows {
                let mut candidate = scope.clone();
                candidate.push((join.alias.as_str(), Some(row)));
                let on = join.on.iter().all(|(left, right)| {
                    let (l, r) = (lookup(&candidate, left), lookup(&candidate, right));
                    !l.is_null() && l.sql_cmp(&r) == Some(Ordering::Equal)
                });
                if on {
                    matched = true;
                    joined.push(candidate);
                }
            }
            if !matched && join.kind == JoinKind::Left {
                let mut candidate = scope;
                candidate.push((join.alias.as_str(), None));
                joined.push(candidate);
            }
        }
        scopes = joined;
    }

    if let Some(condition) = &condition {
        scopes.retain(|scope| ev.test(condition, scope));
    }

    if !spec.order_by.is_empty() {
        scopes.sort_by(|a, b| {
            for order in &spec.order_by {
                let cmp = lookup(a, &order.column).sort_cmp(&lookup(b, &order.column));
                if cmp != Ordering::Equal {
                    return match order.direction {
                        OrderDirection::Asc => cmp,
                        OrderDirection::Desc => cmp.reverse(),
                    };
                }
            }
            Ordering::Equal
        });
    }

    let mut rows: Vec<Row> = if spec.columns.iter().any(|c| matches!(c, SelectItem::CountStar)) {
        let first = scopes.first();
        let row: Row = spec
            .columns
            .iter()
            .map(|item| match (item, first) {
                (SelectItem::CountStar, _) => (item.output_name(), Value::Int(scopes.len() as i64)),
                (SelectItem::Column { column, .. }, Some(scope)) => (item.output_name(), lookup(scope, column)),
                _ => (item.output_name(), Value::Null),
            })
            .collect();
        vec![row]
    } else {
        scopes
            .iter()
            .map(|scope| project(tables, spec, scope))
            .collect::<Result<_>>()?
    };

    if spec.distinct {
        let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
        for row in rows {
            if !unique.contains(&row) {
                unique.push(row);
            }
        }
        rows = unique;
    }

    let offset = spec.offset.map_or(0, |o| usize::try_from(o).unwrap_or(usize::MAX));
    let limit = spec.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    Ok(rows.into_iter().skip(offset).take(limit).collect())
}

fn project(tables: &Tables, spec: &SelectSpec, scope: &Scope<'_>) -> Result<Row> {
    let mut row = Row::new();
    if spec.columns.is_empty() {
        star(tables, spec, scope, &mut row)?;
    }
    for item in &spec.columns {
        match item {
            SelectItem::Star => star(tables, spec, scope, &mut row)?,
            SelectItem::Column { column, .. } => {
                row.set(item.output_name(), lookup(scope, column));
            }
            SelectItem::CountStar => {}
        }
    }
    Ok(row)
}

/// Every column of every table in the scope; joined columns as `alias.col`
fn star(tables: &Tables, spec: &SelectSpec, scope: &Scope<'_>, out: &mut Row) -> Result<()> {
    let sources = std::iter::once((spec.from.alias.as_str(), spec.from.table.as_str()))
        .chain(spec.joins.iter().map(|j| (j.alias.as_str(), j.table.as_str())));
    for (alias, table_name) in sources {
        let row = scope.iter().find(|(a, _)| *a == alias).and_then(|(_, r)| *r);
        for column in &table(tables, table_name)?.columns {
            let value = row.and_then(|r| r.get(column)).cloned().unwrap_or_default();
            if alias == spec.from.alias {
                out.set(column.clone(), value);
            } else {
                out.set(format!("{}.{}", alias, column), value);
            }
        }
    }
    Ok(())
}

/// Indices of rows matching a bare-column condition, with an evaluator
/// already prepared for it
fn matching_rows(tables: &Tables, table: &Table, where_clause: Option<&rsql::Expr>) -> Result<Vec<usize>> {
    let subquery = |q: &SelectSpec| run_select(tables, q);
    let mut ev = Evaluator::new();
    let condition = where_clause.map(|w| ev.prepare(w, &subquery)).transpose()?;
    Ok(table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            let scope: Scope<'_> = vec![(BASE_ALIAS, Some(*row))];
            condition.as_ref().map_or(true, |c| ev.test(c, &scope))
        })
        .map(|(i, _)| i)
        .collect())
}

/// In-memory [`Storage`] with optional YAML persistence
#[derive(Debug)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    dir: Option<PathBuf>,
}

impl MemoryStorage {
    /// Empty tables for every source in the registry
    pub fn new(registry: &SchemaRegistry) -> Self {
        let tables = registry
            .list()
            .into_iter()
            .map(|source| {
                let table = Table::from_source(source);
                (table.name.clone(), table)
            })
            .collect();
        Self {
            tables: RwLock::new(tables),
            dir: None,
        }
    }

    /// Tables for every source, loaded from `<dir>/<table>.yaml` where present
    pub async fn open(registry: &SchemaRegistry, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let mut storage = Self::new(registry);

        for table in storage.tables.get_mut().values_mut() {
            let path = dir.join(format!("{}.yaml", table.name));
            if !path.exists() {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| Error::FileReadError {
                    path: path.clone(),
                    source,
                })?;
            if content.trim().is_empty() {
                continue;
            }
            let rows: Vec<Row> = serde_yaml::from_str(&content).map_err(|e| Error::YamlParseError {
                message: format!("{}: {}", path.display(), e),
            })?;
            table.rows = rows
                .into_iter()
                .map(|row| table.normalize(row, |_| Value::Null))
                .collect::<Result<_>>()?;
            table.check_keys(&table.rows)?;
            tracing::debug!(table = %table.name, rows = table.rows.len(), "loaded table");
        }

        storage.dir = Some(dir);
        Ok(storage)
    }

    /// Snapshot of a table's rows in storage order
    pub async fn rows(&self, table_name: &str) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        Ok(table(&tables, table_name)?.rows.clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn select(&self, spec: &SelectSpec) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        let rows = run_select(&tables, spec)?;
        tracing::trace!(table = %spec.from.table, rows = rows.len(), "select");
        Ok(rows)
    }

    async fn count(&self, spec: &SelectSpec) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(run_select(&tables, spec)?.len() as u64)
    }

    async fn insert(&self, spec: &InsertSpec) -> Result<Row> {
        if spec.columns.len() != spec.values.len() {
            return Err(Error::QueryError {
                message: format!("{} columns but {} values", spec.columns.len(), spec.values.len()),
            });
        }

        let mut tables = self.tables.write().await;
        let table = tables.get_mut(&spec.table).ok_or_else(|| Error::TableNotFound {
            table: spec.table.clone(),
        })?;

        let given: Row = spec
            .columns
            .iter()
            .cloned()
            .zip(spec.values.iter().cloned().map(Value::from))
            .collect();
        let mut row = table.normalize(given, |c| table.defaults.get(c).cloned().unwrap_or_default())?;

        if let Some(column) = &table.auto_increment {
            if row.get(column).map_or(true, Value::is_null) {
                let id = table.next_id(column)?;
                row.set(column.clone(), id);
            }
        }

        table.check_keys(table.rows.iter().chain(std::iter::once(&row)))?;
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, spec: &UpdateSpec) -> Result<u64> {
        let mut tables = self.tables.write().await;

        let updates = {
            let tables: &Tables = &tables;
            let target = table(tables, &spec.table)?;
            if let Some(set) = spec.set.iter().find(|s| !target.columns.contains(&s.column)) {
                return Err(target.unknown_column(&set.column));
            }

            let subquery = |q: &SelectSpec| run_select(tables, q);
            let mut ev = Evaluator::new();
            let values = spec
                .set
                .iter()
                .map(|s| Ok((s.column.as_str(), ev.prepare(&s.value, &subquery)?)))
                .collect::<Result<Vec<_>>>()?;

            let mut updates = Vec::new();
            for i in matching_rows(tables, target, spec.where_clause.as_ref())? {
                let old = &target.rows[i];
                let scope: Scope<'_> = vec![(BASE_ALIAS, Some(old))];
                let mut new = old.clone();
                for (column, expr) in &values {
                    new.set(*column, ev.eval(expr, &scope));
                }
                updates.push((i, new));
            }
            updates
        };

        let target = tables.get_mut(&spec.table).ok_or_else(|| Error::TableNotFound {
            table: spec.table.clone(),
        })?;
        let touches_key = spec.set.iter().any(|s| target.primary_key.contains(&s.column));
        if touches_key {
            let mut candidate = target.rows.clone();
            for (i, row) in &updates {
                candidate[*i] = row.clone();
            }
            target.check_keys(&candidate)?;
        }

        let count = updates.len() as u64;
        for (i, row) in updates {
            target.rows[i] = row;
        }
        Ok(count)
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let doomed = {
            let tables: &Tables = &tables;
            matching_rows(tables, table(tables, &spec.table)?, spec.where_clause.as_ref())?
        };

        let target = tables.get_mut(&spec.table).ok_or_else(|| Error::TableNotFound {
            table: spec.table.clone(),
        })?;
        let mut index = 0;
        target.rows.retain(|_| {
            let keep = doomed.binary_search(&index).is_err();
            index += 1;
            keep
        });
        Ok(doomed.len() as u64)
    }

    async fn flush(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| Error::FileWriteError {
                path: dir.clone(),
                source,
            })?;

        let tables = self.tables.read().await;
        for table in tables.values() {
            let path = dir.join(format!("{}.yaml", table.name));
            let content = serde_yaml::to_string(&table.rows).map_err(|e| Error::YamlSerializeError {
                message: e.to_string(),
            })?;
            tokio::fs::write(&path, content)
                .await
                .map_err(|source| Error::FileWriteError { path, source })?;
        }
        tracing::debug!(dir = %dir.display(), tables = tables.len(), "flushed tables");
        Ok(())
    }
}
