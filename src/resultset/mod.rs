//! Deferred, composable resultsets
//!
//! A [`ResultSet`] is an immutable query specification bound to a result
//! source and a storage handle. Builder methods return a new resultset and
//! leave the receiver untouched; nothing reaches storage until a terminal
//! method (`all`, `count`, `cursor().next()`, `update`, ...) runs.
//!
//! ```no_run
//! # async fn demo(db: &rset::Database) -> rset::Result<()> {
//! let albums = db.resultset("Album")?;
//! let recent = albums.search_str("year >= ?", &[1994.into()])?;
//! let page = recent.join("artist").order_by([rsql::OrderBy::desc("year")]).rows(2).page(1);
//! for row in page.all().await? {
//!     println!("{:?}", row);
//! }
//! # Ok(())
//! # }
//! ```

mod cursor;
mod pager;

pub use cursor::Cursor;
pub use pager::Pager;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::schema::{ResultSource, RowCheck, SchemaRegistry};
use crate::storage::Storage;
use crate::value::{Row, Value};
use rsql::{
    BinaryOp, ColumnRef, CompiledQuery, DeleteSpec, DialectKind, Expr, InsertSpec, Join, Literal, OrderBy,
    SelectItem, SelectSpec, SetClause, UpdateSpec,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Settings a resultset carries from the database configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultSetOptions {
    pub dialect: DialectKind,
    pub trace_sql: bool,
    pub default_rows: u64,
    pub cursor_batch_size: Option<u64>,
}

impl Default for ResultSetOptions {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            trace_sql: false,
            default_rows: 10,
            cursor_batch_size: None,
        }
    }
}

impl From<&Config> for ResultSetOptions {
    fn from(config: &Config) -> Self {
        Self {
            dialect: config.dialect,
            trace_sql: config.trace_sql,
            default_rows: config.default_rows,
            cursor_batch_size: config.cursor_batch_size,
        }
    }
}

/// Query attributes besides the condition
///
/// When merged into a resultset, set fields replace the current value and
/// `join` entries are appended unless already present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    /// Projection; `None` selects every column of the source
    pub columns: Option<Vec<ColumnRef>>,
    /// Relationships to join, by name
    pub join: Vec<String>,
    pub order_by: Option<Vec<OrderBy>>,
    pub rows: Option<u64>,
    pub offset: Option<u64>,
    /// 1-based page number; 0 is read as 1
    pub page: Option<u64>,
    pub distinct: Option<bool>,
}

impl Attributes {
    fn merge(&mut self, other: Attributes) {
        if other.columns.is_some() {
            self.columns = other.columns;
        }
        for rel in other.join {
            if !self.join.contains(&rel) {
                self.join.push(rel);
            }
        }
        if other.order_by.is_some() {
            self.order_by = other.order_by;
        }
        if other.rows.is_some() {
            self.rows = other.rows;
        }
        if other.offset.is_some() {
            self.offset = other.offset;
        }
        if other.page.is_some() {
            self.page = other.page;
        }
        if other.distinct.is_some() {
            self.distinct = other.distinct;
        }
    }
}

/// An immutable, deferred query over one result source
#[derive(Clone)]
pub struct ResultSet {
    source: String,
    schema: Arc<SchemaRegistry>,
    storage: Arc<dyn Storage>,
    options: ResultSetOptions,
    condition: Option<Expr>,
    attrs: Attributes,
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("source", &self.source)
            .field("condition", &self.condition)
            .field("attrs", &self.attrs)
            .finish_non_exhaustive()
    }
}

impl ResultSet {
    /// Resultset over every row of `source`
    pub fn new(
        source: impl Into<String>,
        schema: Arc<SchemaRegistry>,
        storage: Arc<dyn Storage>,
        options: ResultSetOptions,
    ) -> Self {
        Self {
            source: source.into(),
            schema,
            storage,
            options,
            condition: None,
            attrs: Attributes::default(),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source
    }

    pub fn condition(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    pub fn options(&self) -> &ResultSetOptions {
        &self.options
    }

    fn result_source(&self) -> Result<&ResultSource> {
        self.schema.get(&self.source)
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    /// Restrict by a further condition, ANDed with the existing ones
    pub fn search(&self, condition: Expr) -> ResultSet {
        let mut rs = self.clone();
        rs.condition = Expr::and(rs.condition.take(), Some(condition));
        rs
    }

    /// Parse a condition, bind its `?` placeholders in order, then [`search`](Self::search)
    pub fn search_str(&self, condition: &str, params: &[Value]) -> Result<ResultSet> {
        let params: Vec<Literal> = params.iter().cloned().map(Literal::from).collect();
        let expr = rsql::parse(condition)?.bind_params(&params)?;
        Ok(self.search(expr))
    }

    /// Merge query attributes
    pub fn search_attrs(&self, attrs: Attributes) -> ResultSet {
        let mut rs = self.clone();
        rs.attrs.merge(attrs);
        rs
    }

    pub fn order_by(&self, order: impl IntoIterator<Item = OrderBy>) -> ResultSet {
        self.search_attrs(Attributes {
            order_by: Some(order.into_iter().collect()),
            ..Default::default()
        })
    }

    /// Restrict the projection; `rel.col` names a joined column
    pub fn columns<S: AsRef<str>>(&self, columns: impl IntoIterator<Item = S>) -> ResultSet {
        self.search_attrs(Attributes {
            columns: Some(columns.into_iter().map(|c| ColumnRef::parse(c.as_ref())).collect()),
            ..Default::default()
        })
    }

    pub fn rows(&self, rows: u64) -> ResultSet {
        self.search_attrs(Attributes {
            rows: Some(rows),
            ..Default::default()
        })
    }

    pub fn offset(&self, offset: u64) -> ResultSet {
        self.search_attrs(Attributes {
            offset: Some(offset),
            ..Default::default()
        })
    }

    pub fn page(&self, page: u64) -> ResultSet {
        self.search_attrs(Attributes {
            page: Some(page),
            ..Default::default()
        })
    }

    pub fn join(&self, relationship: impl Into<String>) -> ResultSet {
        self.search_attrs(Attributes {
            join: vec![relationship.into()],
            ..Default::default()
        })
    }

    pub fn distinct(&self, distinct: bool) -> ResultSet {
        self.search_attrs(Attributes {
            distinct: Some(distinct),
            ..Default::default()
        })
    }

    /// Resultset over the rows of a relationship's target that are related
    /// to any row of this resultset
    pub fn related(&self, relationship: &str) -> Result<ResultSet> {
        let owner = self.result_source()?;
        let (rel, target) = self.schema.relationship(owner, relationship)?;
        let (owner_col, target_col) = rel.key_columns(owner, target)?;

        let mut keys = self.build_select()?;
        keys.columns = vec![SelectItem::column(ColumnRef::new(owner_col))];
        keys.distinct = false;
        if !keys.is_windowed() {
            keys.order_by.clear();
        }

        let restriction = Expr::InSubquery {
            expr: Box::new(Expr::Column(ColumnRef::new(target_col))),
            query: Box::new(keys),
            negated: false,
        };
        Ok(ResultSet::new(
            target.name.clone(),
            Arc::clone(&self.schema),
            Arc::clone(&self.storage),
            self.options,
        )
        .search(restriction))
    }

    /// Compile without executing
    pub fn as_query(&self) -> Result<CompiledQuery> {
        let spec = self.build_select()?;
        Ok(rsql::compile_select(&spec, self.options.dialect.dialect())?)
    }

    /// Compile the row count without executing
    pub fn as_count_query(&self) -> Result<CompiledQuery> {
        let spec = self.build_select()?;
        Ok(rsql::compile_count(&spec, self.options.dialect.dialect())?)
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    /// Every row, in result order
    pub async fn all(&self) -> Result<Vec<Row>> {
        let spec = self.build_select()?;
        self.fetch(&spec).await
    }

    /// The first row of the result window, if any
    pub async fn first(&self) -> Result<Option<Row>> {
        Ok(self.fetch_at_most(1).await?.into_iter().next())
    }

    /// The only row, or `None`; more than one row is an error
    pub async fn single(&self) -> Result<Option<Row>> {
        let rows = self.fetch_at_most(2).await?;
        if rows.len() > 1 {
            return Err(Error::MultipleRows);
        }
        Ok(rows.into_iter().next())
    }

    /// Look up one row by primary key, values in key column order
    pub async fn find(&self, key: &[Value]) -> Result<Option<Row>> {
        let source = self.result_source()?;
        if key.len() != source.primary_key.len() {
            return Err(Error::PrimaryKeyArity {
                source_name: source.name.clone(),
                expected: source.primary_key.len(),
                actual: key.len(),
            });
        }
        let condition = source
            .primary_key
            .iter()
            .zip(key)
            .map(|(column, value)| {
                Expr::binary(
                    Expr::Column(ColumnRef::new(column.as_str())),
                    BinaryOp::Eq,
                    Expr::Literal(value.clone().into()),
                )
            })
            .fold(None, |acc, eq| Expr::and(acc, Some(eq)));
        match condition {
            Some(condition) => self.search(condition).single().await,
            None => Ok(None),
        }
    }

    /// Number of rows `all` would return
    pub async fn count(&self) -> Result<u64> {
        let spec = self.build_select()?;
        let query = rsql::compile_count(&spec, self.options.dialect.dialect())?;
        self.trace(&query);
        self.storage.count(&spec).await
    }

    /// A lazy cursor; no query runs until its first `next()`
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.clone())
    }

    /// Paging information for the current page
    pub async fn pager(&self) -> Result<Pager> {
        let unpaged = ResultSet {
            attrs: Attributes {
                rows: None,
                offset: None,
                page: None,
                ..self.attrs.clone()
            },
            ..self.clone()
        };
        let total = unpaged.count().await?;
        let per_page = self.attrs.rows.unwrap_or(self.options.default_rows);
        let current = self.attrs.page.unwrap_or(1).max(1);
        Ok(Pager::new(total, per_page, current))
    }

    /// Insert a row and return it as stored
    ///
    /// Columns fixed by `col = value` terms of the condition are filled in
    /// when the row does not set them.
    pub async fn create(&self, row: Row) -> Result<Row> {
        let source = self.result_source()?;
        let mut row = row;
        for (column, value) in self.implicit_values() {
            if !row.contains(&column) {
                row.set(column, value);
            }
        }

        source.validate_row(&row, RowCheck::Insert)?;
        for pk in &source.primary_key {
            let auto = source.column_def(pk).map_or(false, |c| c.auto_increment);
            if !auto && row.get(pk).map_or(true, Value::is_null) {
                return Err(Error::MissingRequiredColumn {
                    source_name: source.name.clone(),
                    column: pk.clone(),
                });
            }
        }

        let (columns, values): (Vec<String>, Vec<Literal>) = row.into_iter().map(|(c, v)| (c, Literal::from(v))).unzip();
        let spec = InsertSpec {
            table: source.table_name(),
            columns,
            values,
        };
        let query = rsql::compile_insert(&spec, self.options.dialect.dialect())?;
        self.trace(&query);
        self.storage.insert(&spec).await
    }

    /// Set columns on every row of the resultset, returning the number updated
    pub async fn update(&self, values: Row) -> Result<u64> {
        let source = self.result_source()?;
        source.validate_row(&values, RowCheck::Update)?;

        let spec = UpdateSpec {
            table: source.table_name(),
            set: values
                .into_iter()
                .map(|(column, value)| SetClause {
                    column,
                    value: Expr::Literal(value.into()),
                })
                .collect(),
            where_clause: self.write_condition(source, "update")?,
        };
        let query = rsql::compile_update(&spec, self.options.dialect.dialect())?;
        self.trace(&query);
        self.storage.update(&spec).await
    }

    /// Delete every row of the resultset, returning the number deleted
    pub async fn delete(&self) -> Result<u64> {
        let source = self.result_source()?;
        let spec = DeleteSpec {
            table: source.table_name(),
            where_clause: self.write_condition(source, "delete")?,
        };
        let query = rsql::compile_delete(&spec, self.options.dialect.dialect())?;
        self.trace(&query);
        self.storage.delete(&spec).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Run the select with its limit lowered to `n`
    async fn fetch_at_most(&self, n: u64) -> Result<Vec<Row>> {
        let mut spec = self.build_select()?;
        spec.limit = Some(spec.limit.map_or(n, |limit| limit.min(n)));
        self.fetch(&spec).await
    }

    /// Compile, trace and run a select
    pub(crate) async fn fetch(&self, spec: &SelectSpec) -> Result<Vec<Row>> {
        let query = rsql::compile_select(spec, self.options.dialect.dialect())?;
        self.trace(&query);
        self.storage.select(spec).await
    }

    fn trace(&self, query: &CompiledQuery) {
        if self.options.trace_sql {
            tracing::info!(target: "rset::sql", source = %self.source, "{}", query);
        } else {
            tracing::debug!(target: "rset::sql", source = %self.source, "{}", query);
        }
    }

    /// `(limit, offset)` after applying paging
    fn window(&self) -> Result<(Option<u64>, Option<u64>)> {
        match self.attrs.page {
            Some(page) => {
                let rows = self.attrs.rows.unwrap_or(self.options.default_rows);
                let offset = (page.max(1) - 1)
                    .checked_mul(rows)
                    .ok_or(Error::PageOutOfRange { page, rows })?;
                Ok((Some(rows), (offset > 0).then_some(offset)))
            }
            None => Ok((self.attrs.rows, self.attrs.offset)),
        }
    }

    /// Resolve the resultset into a select specification, checking every
    /// referenced column against the schema
    pub fn build_select(&self) -> Result<SelectSpec> {
        let source = self.result_source()?;
        let mut spec = SelectSpec::new(source.table_name());

        let mut joined: HashMap<&str, &ResultSource> = HashMap::new();
        for name in &self.attrs.join {
            let (rel, target) = self.schema.relationship(source, name)?;
            let join: Join = rel.join(source, target)?;
            spec.joins.push(join);
            joined.insert(rel.name.as_str(), target);
        }

        let check = |column: &ColumnRef| -> Result<()> {
            let owner = match &column.relation {
                None => source,
                Some(rel) => match joined.get(rel.as_str()) {
                    Some(target) => *target,
                    None if source.relationship_def(rel).is_some() => {
                        return Err(Error::RelationNotJoined { relation: rel.clone() })
                    }
                    None => {
                        return Err(Error::UnknownRelation {
                            source_name: source.name.clone(),
                            relation: rel.clone(),
                        })
                    }
                },
            };
            if !owner.has_column(&column.column) {
                return Err(Error::UnknownColumn {
                    source_name: owner.name.clone(),
                    column: column.column.clone(),
                });
            }
            Ok(())
        };

        spec.columns = match &self.attrs.columns {
            Some(columns) => {
                for column in columns {
                    check(column)?;
                }
                columns.iter().cloned().map(SelectItem::column).collect()
            }
            None => source
                .column_names()
                .map(|c| SelectItem::column(ColumnRef::new(c)))
                .collect(),
        };

        if let Some(condition) = &self.condition {
            for column in condition.columns() {
                check(column)?;
            }
            spec.where_clause = Some(condition.clone());
        }

        if let Some(order) = &self.attrs.order_by {
            for o in order {
                check(&o.column)?;
            }
            spec.order_by = order.clone();
        }

        let (limit, offset) = self.window()?;
        spec.limit = limit;
        spec.offset = offset;
        spec.distinct = self.attrs.distinct.unwrap_or(false);
        Ok(spec)
    }

    /// Condition for an UPDATE or DELETE of exactly this resultset's rows
    ///
    /// Joins and windows cannot be expressed on a bare table, so those
    /// resultsets restrict by primary key through a subquery instead.
    fn write_condition(&self, source: &ResultSource, operation: &'static str) -> Result<Option<Expr>> {
        let select = self.build_select()?;
        if select.joins.is_empty() && !select.is_windowed() {
            return Ok(select.where_clause);
        }

        let pk = source.single_primary_key(operation)?;
        let mut keys = select;
        keys.columns = vec![SelectItem::column(ColumnRef::new(pk))];
        keys.distinct = false;
        Ok(Some(Expr::InSubquery {
            expr: Box::new(Expr::Column(ColumnRef::new(pk))),
            query: Box::new(keys),
            negated: false,
        }))
    }

    /// Unqualified `column = literal` terms ANDed at the top of the condition
    fn implicit_values(&self) -> Vec<(String, Value)> {
        fn collect(expr: &Expr, out: &mut Vec<(String, Value)>) {
            match expr {
                Expr::BinaryOp {
                    left,
                    op: BinaryOp::And,
                    right,
                } => {
                    collect(left, out);
                    collect(right, out);
                }
                Expr::BinaryOp {
                    left,
                    op: BinaryOp::Eq,
                    right,
                } => match (left.as_ref(), right.as_ref()) {
                    (Expr::Column(c), Expr::Literal(lit)) | (Expr::Literal(lit), Expr::Column(c))
                        if c.relation.is_none() && *lit != Literal::Null =>
                    {
                        out.push((c.column.clone(), Value::from(lit.clone())));
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        let mut out = Vec::new();
        if let Some(condition) = &self.condition {
            collect(condition, &mut out);
        }
        out
    }
}
