//! Query compiler
//!
//! Renders specifications to SQL text for a given dialect. Values never
//! appear in the text: each literal becomes a placeholder and is pushed to
//! `binds` in the same order the placeholders appear.

use std::fmt;

use crate::ast::*;
use crate::dialect::SqlDialect;
use crate::error::CompileError;

/// SQL text plus its ordered bind values
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<Literal>,
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.binds.is_empty() {
            let binds: Vec<String> = self.binds.iter().map(|b| b.to_string()).collect();
            write!(f, ": {}", binds.join(", "))?;
        }
        Ok(())
    }
}

/// Compile a SELECT
pub fn compile_select(spec: &SelectSpec, dialect: &dyn SqlDialect) -> Result<CompiledQuery, CompileError> {
    let mut c = Compiler::new(dialect);
    c.select(spec)?;
    Ok(c.finish())
}

/// Compile a row count for a SELECT.
///
/// Ordering is dropped unless the select is windowed, in which case the
/// whole select becomes a subquery so LIMIT/OFFSET still apply.
pub fn compile_count(spec: &SelectSpec, dialect: &dyn SqlDialect) -> Result<CompiledQuery, CompileError> {
    let mut c = Compiler::new(dialect);
    if spec.is_windowed() || spec.distinct {
        c.push("SELECT COUNT(*) FROM (");
        c.select(spec)?;
        c.push(") ");
        c.ident("count_subq");
    } else {
        let mut counted = spec.clone();
        counted.columns = vec![SelectItem::CountStar];
        counted.order_by.clear();
        c.select(&counted)?;
    }
    Ok(c.finish())
}

/// Compile an INSERT
pub fn compile_insert(spec: &InsertSpec, dialect: &dyn SqlDialect) -> Result<CompiledQuery, CompileError> {
    if spec.columns.len() != spec.values.len() {
        return Err(CompileError::ValueCountMismatch {
            columns: spec.columns.len(),
            values: spec.values.len(),
        });
    }

    let mut c = Compiler::new(dialect);
    c.push("INSERT INTO ");
    c.ident(&spec.table);
    if spec.columns.is_empty() {
        c.push(" DEFAULT VALUES");
    } else {
        c.push(" (");
        for (i, col) in spec.columns.iter().enumerate() {
            if i > 0 {
                c.push(", ");
            }
            c.ident(col);
        }
        c.push(") VALUES (");
        for (i, val) in spec.values.iter().enumerate() {
            if i > 0 {
                c.push(", ");
            }
            c.bind(val.clone());
        }
        c.push(")");
    }
    if dialect.supports_returning() {
        c.push(" RETURNING *");
    }
    Ok(c.finish())
}

/// Compile an UPDATE
pub fn compile_update(spec: &UpdateSpec, dialect: &dyn SqlDialect) -> Result<CompiledQuery, CompileError> {
    if spec.set.is_empty() {
        return Err(CompileError::EmptyColumnList("UPDATE"));
    }

    let mut c = Compiler::new(dialect);
    c.qualify = false;
    c.push("UPDATE ");
    c.ident(&spec.table);
    c.push(" SET ");
    for (i, clause) in spec.set.iter().enumerate() {
        if i > 0 {
            c.push(", ");
        }
        c.ident(&clause.column);
        c.push(" = ");
        c.expr(&clause.value)?;
    }
    c.where_clause(spec.where_clause.as_ref())?;
    Ok(c.finish())
}

/// Compile a DELETE
pub fn compile_delete(spec: &DeleteSpec, dialect: &dyn SqlDialect) -> Result<CompiledQuery, CompileError> {
    let mut c = Compiler::new(dialect);
    c.qualify = false;
    c.push("DELETE FROM ");
    c.ident(&spec.table);
    c.where_clause(spec.where_clause.as_ref())?;
    Ok(c.finish())
}

struct Compiler<'d> {
    dialect: &'d dyn SqlDialect,
    sql: String,
    binds: Vec<Literal>,
    /// Qualify bare columns with the base alias
    qualify: bool,
}

impl<'d> Compiler<'d> {
    fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            binds: Vec::new(),
            qualify: true,
        }
    }

    fn finish(self) -> CompiledQuery {
        CompiledQuery {
            sql: self.sql,
            binds: self.binds,
        }
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote_identifier(name);
        self.sql.push_str(&quoted);
    }

    fn bind(&mut self, value: Literal) {
        self.binds.push(value);
        let placeholder = self.dialect.placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
    }

    fn column(&mut self, col: &ColumnRef) {
        match (&col.relation, self.qualify) {
            (Some(rel), _) => {
                self.ident(rel);
                self.push(".");
            }
            (None, true) => {
                self.ident(BASE_ALIAS);
                self.push(".");
            }
            (None, false) => {}
        }
        self.ident(&col.column);
    }

    fn select(&mut self, spec: &SelectSpec) -> Result<(), CompileError> {
        let outer_qualify = self.qualify;
        self.qualify = true;

        self.push("SELECT ");
        if spec.distinct {
            self.push("DISTINCT ");
        }
        if spec.columns.is_empty() {
            self.push("*");
        }
        for (i, item) in spec.columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match item {
                SelectItem::Star => self.push("*"),
                SelectItem::CountStar => self.push("COUNT(*)"),
                SelectItem::Column { column, alias } => {
                    self.column(column);
                    if let Some(alias) = alias {
                        self.push(" AS ");
                        self.ident(alias);
                    }
                }
            }
        }

        self.push(" FROM ");
        self.ident(&spec.from.table);
        self.push(" ");
        self.ident(&spec.from.alias);

        for join in &spec.joins {
            self.push(match join.kind {
                JoinKind::Inner => " JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            self.ident(&join.table);
            self.push(" ");
            self.ident(&join.alias);
            self.push(" ON ");
            for (i, (left, right)) in join.on.iter().enumerate() {
                if i > 0 {
                    self.push(" AND ");
                }
                self.column(left);
                self.push(" = ");
                self.column(right);
            }
        }

        self.where_clause(spec.where_clause.as_ref())?;

        if !spec.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, order) in spec.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.column(&order.column);
                if order.direction == OrderDirection::Desc {
                    self.push(" DESC");
                }
            }
        }

        match (spec.limit, spec.offset) {
            (Some(limit), _) => self.push(&format!(" LIMIT {}", limit)),
            (None, Some(_)) => {
                if let Some(unbounded) = self.dialect.unbounded_limit() {
                    self.push(&format!(" LIMIT {}", unbounded));
                }
            }
            (None, None) => {}
        }
        if let Some(offset) = spec.offset {
            self.push(&format!(" OFFSET {}", offset));
        }

        self.qualify = outer_qualify;
        Ok(())
    }

    fn where_clause(&mut self, expr: Option<&Expr>) -> Result<(), CompileError> {
        if let Some(expr) = expr {
            self.push(" WHERE ");
            self.expr(expr)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(lit) => self.bind(lit.clone()),
            Expr::Column(col) => self.column(col),
            Expr::Param(i) => return Err(CompileError::UnboundParameter(*i)),

            Expr::BinaryOp { left, op, right } => {
                if let Some(operand) = null_comparison(left, *op, right) {
                    self.operand(operand, *op)?;
                    self.push(if *op == BinaryOp::Eq { " IS NULL" } else { " IS NOT NULL" });
                    return Ok(());
                }
                self.operand(left, *op)?;
                self.push(" ");
                self.push(op.sql());
                self.push(" ");
                self.operand(right, *op)?;
            }

            Expr::UnaryOp { op, expr } => match op {
                UnaryOp::Not => {
                    self.push("NOT (");
                    self.expr(expr)?;
                    self.push(")");
                }
                UnaryOp::Neg => {
                    self.push("-");
                    self.operand(expr, BinaryOp::Mul)?;
                }
            },

            Expr::In { expr, values, negated } => {
                if values.is_empty() {
                    self.push(if *negated { "1=1" } else { "1=0" });
                    return Ok(());
                }
                self.operand(expr, BinaryOp::Eq)?;
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(v)?;
                }
                self.push(")");
            }

            Expr::InSubquery { expr, query, negated } => {
                self.operand(expr, BinaryOp::Eq)?;
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.select(query)?;
                self.push(")");
            }

            Expr::Like { expr, pattern, negated } => {
                self.operand(expr, BinaryOp::Eq)?;
                self.push(if *negated { " NOT LIKE " } else { " LIKE " });
                self.operand(pattern, BinaryOp::Eq)?;
            }

            Expr::IsNull { expr, negated } => {
                self.operand(expr, BinaryOp::Eq)?;
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }

            Expr::Between { expr, low, high, negated } => {
                self.operand(expr, BinaryOp::Eq)?;
                self.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.operand(low, BinaryOp::Eq)?;
                self.push(" AND ");
                self.operand(high, BinaryOp::Eq)?;
            }
        }
        Ok(())
    }

    /// Render a child of `parent`, parenthesising where precedence requires
    fn operand(&mut self, child: &Expr, parent: BinaryOp) -> Result<(), CompileError> {
        let needs_parens = match child {
            Expr::BinaryOp { op, .. } if parent.is_logical() => op.is_logical() && *op != parent,
            Expr::BinaryOp { .. } => true,
            Expr::UnaryOp { .. }
            | Expr::In { .. }
            | Expr::InSubquery { .. }
            | Expr::Like { .. }
            | Expr::IsNull { .. }
            | Expr::Between { .. } => !parent.is_logical(),
            _ => false,
        };
        if needs_parens {
            self.push("(");
            self.expr(child)?;
            self.push(")");
        } else {
            self.expr(child)?;
        }
        Ok(())
    }
}

/// For `x = NULL` / `x != NULL`, the non-null operand
fn null_comparison<'a>(left: &'a Expr, op: BinaryOp, right: &'a Expr) -> Option<&'a Expr> {
    if !matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        return None;
    }
    match (left, right) {
        (Expr::Literal(Literal::Null), Expr::Literal(Literal::Null)) => None,
        (other, Expr::Literal(Literal::Null)) | (Expr::Literal(Literal::Null), other) => Some(other),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySql, Postgres, Sqlite};
    use crate::parser::parse_condition;

    fn albums() -> SelectSpec {
        let mut spec = SelectSpec::new("album");
        spec.columns = vec![
            SelectItem::column(ColumnRef::new("albumid")),
            SelectItem::column(ColumnRef::new("title")),
        ];
        spec
    }

    #[test]
    fn test_simple_select() {
        let q = compile_select(&SelectSpec::new("artist"), &Postgres).unwrap();
        assert_eq!(q.sql, "SELECT * FROM \"artist\" \"me\"");
        assert!(q.binds.is_empty());
    }

    #[test]
    fn test_select_with_where_order_limit() {
        let mut spec = albums();
        spec.where_clause = Some(parse_condition("year > 1990 AND title LIKE 'P%'").unwrap());
        spec.order_by = vec![OrderBy::desc("year")];
        spec.limit = Some(10);
        spec.offset = Some(20);

        let q = compile_select(&spec, &Postgres).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"me\".\"albumid\", \"me\".\"title\" FROM \"album\" \"me\" \
             WHERE \"me\".\"year\" > $1 AND \"me\".\"title\" LIKE $2 \
             ORDER BY \"me\".\"year\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(q.binds, vec![Literal::Int(1990), Literal::String("P%".into())]);
    }

    #[test]
    fn test_bind_order_matches_placeholders() {
        let mut spec = SelectSpec::new("t");
        spec.where_clause = Some(parse_condition("a = 'x' OR (b IN (1, 2) AND c BETWEEN 3 AND 4)").unwrap());

        let pg = compile_select(&spec, &Postgres).unwrap();
        for n in 1..=5 {
            assert!(pg.sql.contains(&format!("${}", n)));
        }
        let positions: Vec<usize> = (1..=5).map(|n| pg.sql.find(&format!("${}", n)).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let lite = compile_select(&spec, &Sqlite).unwrap();
        assert_eq!(lite.sql.matches('?').count(), 5);
        assert_eq!(lite.binds, pg.binds);
        assert_eq!(
            pg.binds,
            vec![
                Literal::String("x".into()),
                Literal::Int(1),
                Literal::Int(2),
                Literal::Int(3),
                Literal::Int(4),
            ]
        );
    }

    #[test]
    fn test_mixed_logic_is_parenthesised() {
        let mut spec = SelectSpec::new("t");
        spec.where_clause = Some(parse_condition("(a = 1 OR b = 2) AND c = 3").unwrap());
        let q = compile_select(&spec, &Sqlite).unwrap();
        assert!(q.sql.ends_with("WHERE (\"me\".\"a\" = ? OR \"me\".\"b\" = ?) AND \"me\".\"c\" = ?"));
    }

    #[test]
    fn test_null_comparisons() {
        let mut spec = SelectSpec::new("t");
        spec.where_clause = Some(parse_condition("a = NULL AND b != NULL").unwrap());
        let q = compile_select(&spec, &Postgres).unwrap();
        assert!(q.sql.ends_with("WHERE \"me\".\"a\" IS NULL AND \"me\".\"b\" IS NOT NULL"));
        assert!(q.binds.is_empty());
    }

    #[test]
    fn test_empty_in_lists() {
        let mut spec = SelectSpec::new("t");
        spec.where_clause = Some(Expr::In {
            expr: Box::new(Expr::col("a")),
            values: vec![],
            negated: false,
        });
        assert!(compile_select(&spec, &Postgres).unwrap().sql.ends_with("WHERE 1=0"));

        spec.where_clause = Some(Expr::In {
            expr: Box::new(Expr::col("a")),
            values: vec![],
            negated: true,
        });
        assert!(compile_select(&spec, &Postgres).unwrap().sql.ends_with("WHERE 1=1"));
    }

    #[test]
    fn test_joins() {
        let mut spec = albums();
        spec.columns.push(SelectItem::Column {
            column: ColumnRef::qualified("artist", "name"),
            alias: Some("artist_name".into()),
        });
        spec.joins.push(Join {
            kind: JoinKind::Inner,
            table: "artist".into(),
            alias: "artist".into(),
            on: vec![(ColumnRef::new("artist"), ColumnRef::qualified("artist", "artistid"))],
        });
        spec.where_clause = Some(Expr::eq("artist.name", "Blur"));

        let q = compile_select(&spec, &MySql).unwrap();
        assert_eq!(
            q.sql,
            "SELECT `me`.`albumid`, `me`.`title`, `artist`.`name` AS `artist_name` \
             FROM `album` `me` JOIN `artist` `artist` ON `me`.`artist` = `artist`.`artistid` \
             WHERE `artist`.`name` = ?"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let mut spec = SelectSpec::new("t");
        spec.offset = Some(5);
        assert!(compile_select(&spec, &Postgres).unwrap().sql.ends_with("\"me\" OFFSET 5"));
        assert!(compile_select(&spec, &Sqlite).unwrap().sql.ends_with("LIMIT -1 OFFSET 5"));
        assert!(compile_select(&spec, &MySql)
            .unwrap()
            .sql
            .ends_with("LIMIT 18446744073709551615 OFFSET 5"));
    }

    #[test]
    fn test_count() {
        let mut spec = albums();
        spec.order_by = vec![OrderBy::asc("title")];
        spec.where_clause = Some(Expr::eq("year", 1994i64));

        let q = compile_count(&spec, &Postgres).unwrap();
        assert_eq!(q.sql, "SELECT COUNT(*) FROM \"album\" \"me\" WHERE \"me\".\"year\" = $1");

        spec.limit = Some(3);
        let q = compile_count(&spec, &Postgres).unwrap();
        assert!(q.sql.starts_with("SELECT COUNT(*) FROM (SELECT \"me\".\"albumid\""));
        assert!(q.sql.ends_with("ORDER BY \"me\".\"title\" LIMIT 3) \"count_subq\""));
        assert_eq!(q.binds, vec![Literal::Int(1994)]);
    }

    #[test]
    fn test_insert() {
        let spec = InsertSpec {
            table: "artist".into(),
            columns: vec!["name".into()],
            values: vec![Literal::String("Pulp".into())],
        };
        let q = compile_insert(&spec, &Postgres).unwrap();
        assert_eq!(q.sql, "INSERT INTO \"artist\" (\"name\") VALUES ($1) RETURNING *");
        assert_eq!(compile_insert(&spec, &MySql).unwrap().sql, "INSERT INTO `artist` (`name`) VALUES (?)");

        let bad = InsertSpec {
            values: vec![],
            ..spec
        };
        assert_eq!(
            compile_insert(&bad, &Postgres),
            Err(CompileError::ValueCountMismatch { columns: 1, values: 0 })
        );
    }

    #[test]
    fn test_update_and_delete_use_bare_columns() {
        let update = UpdateSpec {
            table: "album".into(),
            set: vec![SetClause {
                column: "year".into(),
                value: Expr::binary(Expr::col("year"), BinaryOp::Add, Expr::lit(1i64)),
            }],
            where_clause: Some(Expr::eq("title", "Parklife")),
        };
        let q = compile_update(&update, &Postgres).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"album\" SET \"year\" = \"year\" + $1 WHERE \"title\" = $2"
        );

        let delete = DeleteSpec {
            table: "album".into(),
            where_clause: Some(Expr::InSubquery {
                expr: Box::new(Expr::col("albumid")),
                query: Box::new({
                    let mut sub = SelectSpec::new("album");
                    sub.columns = vec![SelectItem::column(ColumnRef::new("albumid"))];
                    sub.limit = Some(1);
                    sub
                }),
                negated: false,
            }),
        };
        let q = compile_delete(&delete, &Postgres).unwrap();
        assert_eq!(
            q.sql,
            "DELETE FROM \"album\" WHERE \"albumid\" IN (SELECT \"me\".\"albumid\" FROM \"album\" \"me\" LIMIT 1)"
        );
    }

    #[test]
    fn test_unbound_param_is_error() {
        let mut spec = SelectSpec::new("t");
        spec.where_clause = Some(parse_condition("a = ?").unwrap());
        assert_eq!(compile_select(&spec, &Postgres), Err(CompileError::UnboundParameter(0)));
    }

    #[test]
    fn test_unary_operands_are_grouped() {
        let mut spec = SelectSpec::new("t");
        let condition = parse_condition("- -year = ? AND title = ?").unwrap();
        spec.where_clause = Some(condition.bind_params(&[1i64.into(), "x".into()]).unwrap());
        let q = compile_select(&spec, &Postgres).unwrap();
        assert!(!q.sql.contains("--"), "{}", q.sql);
        assert!(q.sql.ends_with("WHERE (-(-\"me\".\"year\")) = $1 AND \"me\".\"title\" = $2"), "{}", q.sql);

        spec.where_clause = Some(Expr::binary(Expr::not(Expr::col("a")), BinaryOp::Lt, Expr::lit(1i64)));
        let q = compile_select(&spec, &Postgres).unwrap();
        assert!(q.sql.ends_with("WHERE (NOT (\"me\".\"a\")) < $1"), "{}", q.sql);

        spec.where_clause = Some(Expr::binary(Expr::not(Expr::col("a")), BinaryOp::And, Expr::col("b")));
        let q = compile_select(&spec, &Postgres).unwrap();
        assert!(q.sql.ends_with("WHERE NOT (\"me\".\"a\") AND \"me\".\"b\""), "{}", q.sql);
    }

    #[test]
    fn test_like_pattern_is_bound() {
        let mut spec = SelectSpec::new("t");
        spec.where_clause = Some(parse_condition("name NOT LIKE ?").unwrap());
        assert_eq!(compile_select(&spec, &Postgres), Err(CompileError::UnboundParameter(0)));

        spec.where_clause = spec.where_clause.map(|e| e.bind_params(&["B%".into()]).unwrap());
        let q = compile_select(&spec, &MySql).unwrap();
        assert!(q.sql.ends_with("WHERE `me`.`name` NOT LIKE ?"), "{}", q.sql);
        assert_eq!(q.binds, vec![Literal::String("B%".into())]);
    }

    #[test]
    fn test_display() {
        let mut spec = SelectSpec::new("t");
        spec.where_clause = Some(Expr::eq("name", "Blur"));
        let q = compile_select(&spec, &Sqlite).unwrap();
        assert_eq!(q.to_string(), "SELECT * FROM \"t\" \"me\" WHERE \"me\".\"name\" = ?: 'Blur'");
    }
}
