//! Query specification values
//!
//! Everything here is a plain immutable value: building a specification never
//! touches a database. The compiler turns these into SQL text plus binds.

use serde::{Deserialize, Serialize};

/// Alias given to the base table of every SELECT
pub const BASE_ALIAS: &str = "me";

/// A reference to a table in FROM / JOIN position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: BASE_ALIAS.to_string(),
        }
    }
}

/// SELECT specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectSpec {
    pub from: TableRef,
    /// Projection (empty = *)
    pub columns: Vec<SelectItem>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    #[serde(default)]
    pub distinct: bool,
}

impl SelectSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            from: TableRef::new(table),
            columns: vec![],
            joins: vec![],
            where_clause: None,
            order_by: vec![],
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// True when LIMIT or OFFSET restricts the row set
    pub fn is_windowed(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }
}

/// One item of a SELECT projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    Star,
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
    CountStar,
}

impl SelectItem {
    pub fn column(column: ColumnRef) -> Self {
        Self::Column { column, alias: None }
    }

    /// Name under which the item appears in a result row
    pub fn output_name(&self) -> String {
        match self {
            SelectItem::Star => "*".to_string(),
            SelectItem::CountStar => "count".to_string(),
            SelectItem::Column { alias: Some(alias), .. } => alias.clone(),
            SelectItem::Column { column, alias: None } => column.output_name(),
        }
    }
}

/// A column, optionally qualified by a relation alias
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// `None` refers to the base table (`me`)
    pub relation: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            relation: None,
            column: column.into(),
        }
    }

    pub fn qualified(relation: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            column: column.into(),
        }
    }

    /// Parse `col` or `rel.col`. `me.col` is normalised to the unqualified form.
    pub fn parse(input: &str) -> Self {
        match input.split_once('.') {
            Some((rel, col)) if rel == BASE_ALIAS => Self::new(col),
            Some((rel, col)) => Self::qualified(rel, col),
            None => Self::new(input),
        }
    }

    /// Relation alias this column lives on, `me` for the base table
    pub fn alias(&self) -> &str {
        self.relation.as_deref().unwrap_or(BASE_ALIAS)
    }

    pub fn output_name(&self) -> String {
        match &self.relation {
            Some(rel) => format!("{}.{}", rel, self.column),
            None => self.column.clone(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.alias(), self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
}

/// JOIN clause; `on` pairs are compared for equality and ANDed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub on: Vec<(ColumnRef, ColumnRef)>,
}

/// ORDER BY clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: ColumnRef::parse(&column.into()),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: ColumnRef::parse(&column.into()),
            direction: OrderDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// INSERT specification (single row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertSpec {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Literal>,
}

/// UPDATE specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSpec {
    pub table: String,
    pub set: Vec<SetClause>,
    pub where_clause: Option<Expr>,
}

/// SET clause in UPDATE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetClause {
    pub column: String,
    pub value: Expr,
}

/// DELETE specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSpec {
    pub table: String,
    pub where_clause: Option<Expr>,
}

/// Condition and value expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Column(ColumnRef),
    /// Positional `?` placeholder awaiting a value
    Param(usize),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<SelectSpec>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        /// A string literal or a parameter
        pattern: Box<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int(i)
    }
}

impl From<f64> for Literal {
    fn from(x: f64) -> Self {
        Literal::Float(x)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // String
    Concat,
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Raised by [`Expr::bind_params`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindError {
    #[error("no value supplied for placeholder #{0}")]
    Missing(usize),
    #[error("{supplied} values supplied for {expected} placeholders")]
    Surplus { expected: usize, supplied: usize },
}

impl Expr {
    pub fn col(name: &str) -> Self {
        Expr::Column(ColumnRef::parse(name))
    }

    pub fn lit(value: impl Into<Literal>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// `column = value`
    pub fn eq(column: &str, value: impl Into<Literal>) -> Self {
        Self::binary(Self::col(column), BinaryOp::Eq, Self::lit(value))
    }

    /// `column <op> value`
    pub fn cmp(column: &str, op: BinaryOp, value: impl Into<Literal>) -> Self {
        Self::binary(Self::col(column), op, Self::lit(value))
    }

    /// `column IN (values...)`
    pub fn in_list<L: Into<Literal>>(column: &str, values: impl IntoIterator<Item = L>) -> Self {
        Expr::In {
            expr: Box::new(Self::col(column)),
            values: values.into_iter().map(|v| Expr::Literal(v.into())).collect(),
            negated: false,
        }
    }

    /// `column LIKE pattern`
    pub fn like(column: &str, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(Self::col(column)),
            pattern: Box::new(Expr::Literal(Literal::String(pattern.into()))),
            negated: false,
        }
    }

    pub fn is_null(column: &str) -> Self {
        Expr::IsNull {
            expr: Box::new(Self::col(column)),
            negated: false,
        }
    }

    pub fn not(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    /// AND two optional conditions, `None` being the identity
    pub fn and(left: Option<Expr>, right: Option<Expr>) -> Option<Expr> {
        match (left, right) {
            (None, None) => None,
            (Some(e), None) | (None, Some(e)) => Some(e),
            (Some(l), Some(r)) => Some(Self::binary(l, BinaryOp::And, r)),
        }
    }

    /// Number of distinct `?` placeholders (highest index + 1)
    pub fn param_count(&self) -> usize {
        let mut max = 0;
        self.walk(&mut |e| {
            if let Expr::Param(i) = e {
                max = max.max(i + 1);
            }
        });
        max
    }

    /// Replace every `Param(i)` with `params[i]`
    pub fn bind_params(self, params: &[Literal]) -> Result<Expr, BindError> {
        let expected = self.param_count();
        if params.len() > expected {
            return Err(BindError::Surplus {
                expected,
                supplied: params.len(),
            });
        }
        self.substitute(params)
    }

    fn substitute(self, params: &[Literal]) -> Result<Expr, BindError> {
        let sub = |e: Box<Expr>| -> Result<Box<Expr>, BindError> { Ok(Box::new(e.substitute(params)?)) };
        Ok(match self {
            Expr::Param(i) => Expr::Literal(params.get(i).cloned().ok_or(BindError::Missing(i))?),
            Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
                left: sub(left)?,
                op,
                right: sub(right)?,
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp { op, expr: sub(expr)? },
            Expr::In { expr, values, negated } => Expr::In {
                expr: sub(expr)?,
                values: values
                    .into_iter()
                    .map(|v| v.substitute(params))
                    .collect::<Result<_, _>>()?,
                negated,
            },
            Expr::InSubquery { expr, query, negated } => Expr::InSubquery {
                expr: sub(expr)?,
                query,
                negated,
            },
            Expr::Like { expr, pattern, negated } => Expr::Like {
                expr: sub(expr)?,
                pattern: sub(pattern)?,
                negated,
            },
            Expr::IsNull { expr, negated } => Expr::IsNull { expr: sub(expr)?, negated },
            Expr::Between { expr, low, high, negated } => Expr::Between {
                expr: sub(expr)?,
                low: sub(low)?,
                high: sub(high)?,
                negated,
            },
            other @ (Expr::Literal(_) | Expr::Column(_)) => other,
        })
    }

    /// Every column referenced outside of subqueries
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.walk_refs(&mut out);
        out
    }

    fn walk_refs<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) | Expr::Param(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.walk_refs(out);
                right.walk_refs(out);
            }
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::InSubquery { expr, .. } => {
                expr.walk_refs(out)
            }
            Expr::Like { expr, pattern, .. } => {
                expr.walk_refs(out);
                pattern.walk_refs(out);
            }
            Expr::In { expr, values, .. } => {
                expr.walk_refs(out);
                for v in values {
                    v.walk_refs(out);
                }
            }
            Expr::Between { expr, low, high, .. } => {
                expr.walk_refs(out);
                low.walk_refs(out);
                high.walk_refs(out);
            }
        }
    }

    fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Column(_) | Expr::Param(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::InSubquery { expr, .. } => expr.walk(f),
            Expr::Like { expr, pattern, .. } => {
                expr.walk(f);
                pattern.walk(f);
            }
            Expr::In { expr, values, .. } => {
                expr.walk(f);
                for v in values {
                    v.walk(f);
                }
            }
            Expr::Between { expr, low, high, .. } => {
                expr.walk(f);
                low.walk(f);
                high.walk(f);
            }
        }
    }
}
