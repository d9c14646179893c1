//! Expression evaluation over joined rows
//!
//! Follows SQL three-valued logic: `Value::Null` doubles as UNKNOWN, and a
//! row only passes a filter when its condition is exactly TRUE.

use crate::error::{Error, Result};
use crate::value::{Row, Value};
use regex::Regex;
use rsql::{BinaryOp, ColumnRef, Expr, Literal, SelectSpec, UnaryOp};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One candidate result row: each table alias with its row, `None` for the
/// missing side of a LEFT JOIN
pub(crate) type Scope<'a> = Vec<(&'a str, Option<&'a Row>)>;

/// Value of a column in a scope; unknown aliases and columns read as NULL
pub(crate) fn lookup(scope: &Scope<'_>, column: &ColumnRef) -> Value {
    scope
        .iter()
        .find(|(alias, _)| *alias == column.alias())
        .and_then(|(_, row)| *row)
        .and_then(|row| row.get(&column.column))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Evaluates prepared expressions
///
/// [`Evaluator::prepare`] must run on every expression first: it runs
/// subqueries, compiles LIKE patterns and rejects unbound parameters, so
/// evaluation itself cannot fail.
#[derive(Debug, Default)]
pub(crate) struct Evaluator {
    patterns: HashMap<String, Regex>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an expression for evaluation. `subquery` runs an inner select.
    pub fn prepare(
        &mut self,
        expr: &Expr,
        subquery: &dyn Fn(&SelectSpec) -> Result<Vec<Row>>,
    ) -> Result<Expr> {
        let mut prep = |e: &Expr| -> Result<Box<Expr>> { Ok(Box::new(self.prepare(e, subquery)?)) };
        Ok(match expr {
            Expr::Param(i) => {
                return Err(Error::QueryError {
                    message: format!("placeholder #{} was never bound", i),
                })
            }
            Expr::Literal(_) | Expr::Column(_) => expr.clone(),
            Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
                left: prep(left)?,
                op: *op,
                right: prep(right)?,
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp {
                op: *op,
                expr: prep(expr)?,
            },
            Expr::In { expr, values, negated } => {
                let expr = prep(expr)?;
                let values = values
                    .iter()
                    .map(|v| self.prepare(v, subquery))
                    .collect::<Result<Vec<_>>>()?;
                Expr::In {
                    expr,
                    values,
                    negated: *negated,
                }
            }
            Expr::InSubquery { expr, query, negated } => {
                let expr = prep(expr)?;
                let values = subquery(query)?
                    .into_iter()
                    .map(|row| {
                        let value = row.into_iter().next().map(|(_, v)| v).unwrap_or_default();
                        Expr::Literal(Literal::from(value))
                    })
                    .collect();
                Expr::In {
                    expr,
                    values,
                    negated: *negated,
                }
            }
            Expr::Like { expr, pattern, negated } => {
                let expr = prep(expr)?;
                let pattern = prep(pattern)?;
                if let Expr::Literal(Literal::String(p)) = pattern.as_ref() {
                    if !self.patterns.contains_key(p) {
                        self.patterns.insert(p.clone(), like_regex(p)?);
                    }
                }
                Expr::Like {
                    expr,
                    pattern,
                    negated: *negated,
                }
            }
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: prep(expr)?,
                negated: *negated,
            },
            Expr::Between { expr, low, high, negated } => Expr::Between {
                expr: prep(expr)?,
                low: prep(low)?,
                high: prep(high)?,
                negated: *negated,
            },
        })
    }

    /// Whether a prepared condition is TRUE for a scope
    pub fn test(&self, expr: &Expr, scope: &Scope<'_>) -> bool {
        truth(&self.eval(expr, scope)) == Some(true)
    }

    /// Evaluate a prepared expression
    pub fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> Value {
        match expr {
            Expr::Literal(lit) => Value::from(lit.clone()),
            Expr::Column(col) => lookup(scope, col),
            Expr::Param(_) | Expr::InSubquery { .. } => Value::Null,

            Expr::BinaryOp { left, op, right } => match op {
                BinaryOp::And => {
                    let l = truth(&self.eval(left, scope));
                    if l == Some(false) {
                        return Value::Bool(false);
                    }
                    match (l, truth(&self.eval(right, scope))) {
                        (_, Some(false)) => Value::Bool(false),
                        (Some(true), Some(true)) => Value::Bool(true),
                        _ => Value::Null,
                    }
                }
                BinaryOp::Or => {
                    let l = truth(&self.eval(left, scope));
                    if l == Some(true) {
                        return Value::Bool(true);
                    }
                    match (l, truth(&self.eval(right, scope))) {
                        (_, Some(true)) => Value::Bool(true),
                        (Some(false), Some(false)) => Value::Bool(false),
                        _ => Value::Null,
                    }
                }
                _ => binary(&self.eval(left, scope), *op, &self.eval(right, scope)),
            },

            Expr::UnaryOp { op, expr } => {
                let value = self.eval(expr, scope);
                match op {
                    UnaryOp::Not => truth(&value).map(|b| Value::Bool(!b)).unwrap_or(Value::Null),
                    UnaryOp::Neg => match value {
                        Value::Int(i) => i.checked_neg().map(Value::Int).unwrap_or(Value::Null),
                        Value::Float(f) => Value::Float(-f),
                        _ => Value::Null,
                    },
                }
            }

            Expr::In { expr, values, negated } => {
                if values.is_empty() {
                    return Value::Bool(*negated);
                }
                let needle = self.eval(expr, scope);
                if needle.is_null() {
                    return Value::Null;
                }
                let mut unknown = false;
                for candidate in values {
                    match equals(&needle, &self.eval(candidate, scope)) {
                        Some(true) => return Value::Bool(!negated),
                        Some(false) => {}
                        None => unknown = true,
                    }
                }
                if unknown {
                    Value::Null
                } else {
                    Value::Bool(*negated)
                }
            }

            Expr::Like { expr, pattern, negated } => {
                let (Some(text), Some(pattern)) = (as_text(self.eval(expr, scope)), as_text(self.eval(pattern, scope)))
                else {
                    return Value::Null;
                };
                // literal patterns were compiled by prepare
                let matched = match self.patterns.get(&pattern) {
                    Some(re) => re.is_match(&text),
                    None => match like_regex(&pattern) {
                        Ok(re) => re.is_match(&text),
                        Err(_) => return Value::Null,
                    },
                };
                Value::Bool(matched != *negated)
            }

            Expr::IsNull { expr, negated } => Value::Bool(self.eval(expr, scope).is_null() != *negated),

            Expr::Between { expr, low, high, negated } => {
                let value = self.eval(expr, scope);
                let above = compare(&value, &self.eval(low, scope), |o| o != Ordering::Less);
                let below = compare(&value, &self.eval(high, scope), |o| o != Ordering::Greater);
                let inside = match (truth(&above), truth(&below)) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                inside.map(|b| Value::Bool(b != *negated)).unwrap_or(Value::Null)
            }
        }
    }
}

/// Boolean reading of a value; `None` is UNKNOWN
fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        _ => None,
    }
}

/// SQL equality: UNKNOWN when either side is NULL, false across types
fn equals(a: &Value, b: &Value) -> Option<bool> {
    if a.is_null() || b.is_null() {
        return None;
    }
    Some(a.sql_cmp(b) == Some(Ordering::Equal))
}

fn compare(a: &Value, b: &Value, accept: impl Fn(Ordering) -> bool) -> Value {
    if a.is_null() || b.is_null() {
        return Value::Null;
    }
    Value::Bool(a.sql_cmp(b).map(accept).unwrap_or(false))
}

fn binary(left: &Value, op: BinaryOp, right: &Value) -> Value {
    match op {
        BinaryOp::Eq => equals(left, right).map(Value::Bool).unwrap_or(Value::Null),
        BinaryOp::Ne => equals(left, right).map(|b| Value::Bool(!b)).unwrap_or(Value::Null),
        BinaryOp::Lt => compare(left, right, |o| o == Ordering::Less),
        BinaryOp::Le => compare(left, right, |o| o != Ordering::Greater),
        BinaryOp::Gt => compare(left, right, |o| o == Ordering::Greater),
        BinaryOp::Ge => compare(left, right, |o| o != Ordering::Less),

        BinaryOp::Add => arithmetic(left, right, i64::checked_add, |a, b| a + b),
        BinaryOp::Sub => arithmetic(left, right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(left, right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => arithmetic(left, right, i64::checked_div, |a, b| if b == 0.0 { f64::NAN } else { a / b }),
        BinaryOp::Mod => arithmetic(left, right, i64::checked_rem, |a, b| if b == 0.0 { f64::NAN } else { a % b }),

        BinaryOp::Concat => {
            if left.is_null() || right.is_null() {
                Value::Null
            } else {
                Value::String(format!("{}{}", left, right))
            }
        }

        // Short-circuited in `Evaluator::eval`
        BinaryOp::And | BinaryOp::Or => Value::Null,
    }
}

fn arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    let result = match (left, right) {
        (Value::Int(a), Value::Int(b)) => return int_op(*a, *b).map(Value::Int).unwrap_or(Value::Null),
        (Value::Float(a), Value::Float(b)) => float_op(*a, *b),
        (Value::Int(a), Value::Float(b)) => float_op(*a as f64, *b),
        (Value::Float(a), Value::Int(b)) => float_op(*a, *b as f64),
        _ => return Value::Null,
    };
    if result.is_nan() {
        Value::Null
    } else {
        Value::Float(result)
    }
}

fn as_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Anchored regex for a LIKE pattern: `%` is any run, `_` any one character
fn like_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::from("(?s)^");
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| Error::QueryError {
        message: format!("invalid LIKE pattern '{}': {}", pattern, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_subqueries(_: &SelectSpec) -> Result<Vec<Row>> {
        Ok(vec![])
    }

    fn check(condition: &str, row: &Row) -> bool {
        let mut ev = Evaluator::new();
        let expr = ev.prepare(&rsql::parse(condition).unwrap(), &no_subqueries).unwrap();
        ev.test(&expr, &vec![("me", Some(row))])
    }

    fn album() -> Row {
        Row::new()
            .with("title", "Parklife")
            .with("year", 1994i64)
            .with("rating", 4.5)
            .with("label", Value::Null)
    }

    #[test]
    fn test_comparisons() {
        let row = album();
        assert!(check("year = 1994", &row));
        assert!(check("year > 1990 AND year <= 1994", &row));
        assert!(check("rating > 4", &row));
        assert!(!check("title = 1994", &row));
        assert!(check("title != 1994", &row));
    }

    #[test]
    fn test_three_valued_logic() {
        let row = album();
        assert!(!check("label = 'Food'", &row));
        assert!(!check("label != 'Food'", &row));
        assert!(!check("NOT (label = 'Food')", &row));
        assert!(check("label = 'Food' OR year = 1994", &row));
        assert!(!check("label = 'Food' AND year = 1994", &row));
        assert!(check("NOT (label = 'Food' AND year = 1993)", &row));
        assert!(check("label IS NULL", &row));
        assert!(!check("year NOT IN (1993, NULL)", &row));
        assert!(check("year IN (1994, NULL)", &row));
    }

    #[test]
    fn test_like_escapes_regex() {
        let row = Row::new().with("name", "a.b (live)").with("code", "a+b");
        assert!(check("name LIKE 'a.b%'", &row));
        assert!(!check("name LIKE 'aXb%'", &row));
        assert!(check("name LIKE '%(live)'", &row));
        assert!(check("code LIKE 'a+_'", &row));
        assert!(!check("code LIKE 'aa+b'", &row));
        assert!(check("name NOT LIKE 'b%'", &row));
    }

    #[test]
    fn test_like_with_bound_and_column_patterns() {
        let row = Row::new().with("name", "Blur").with("prefix", "Bl%").with("label", Value::Null);
        let mut ev = Evaluator::new();
        let scope = vec![("me", Some(&row))];

        let bound = rsql::parse("name LIKE ?").unwrap().bind_params(&["B%".into()]).unwrap();
        let bound = ev.prepare(&bound, &no_subqueries).unwrap();
        assert!(ev.test(&bound, &scope));

        let by_column = |column: &str, negated| Expr::Like {
            expr: Box::new(Expr::col("name")),
            pattern: Box::new(Expr::col(column)),
            negated,
        };
        let prefix = ev.prepare(&by_column("prefix", false), &no_subqueries).unwrap();
        assert!(ev.test(&prefix, &scope));
        for negated in [false, true] {
            let null_pattern = ev.prepare(&by_column("label", negated), &no_subqueries).unwrap();
            assert_eq!(ev.eval(&null_pattern, &scope), Value::Null);
        }
    }

    #[test]
    fn test_empty_in_list_ignores_null() {
        let row = album();
        let empty = |negated| Expr::In {
            expr: Box::new(Expr::col("label")),
            values: vec![],
            negated,
        };
        let mut ev = Evaluator::new();
        let scope = vec![("me", Some(&row))];
        let not_in = ev.prepare(&empty(true), &no_subqueries).unwrap();
        assert!(ev.test(&not_in, &scope));
        let is_in = ev.prepare(&empty(false), &no_subqueries).unwrap();
        assert_eq!(ev.eval(&is_in, &scope), Value::Bool(false));

        // an empty subquery result behaves the same way
        let sub = Expr::InSubquery {
            expr: Box::new(Expr::col("label")),
            query: Box::new(SelectSpec::new("album")),
            negated: true,
        };
        let prepared = ev.prepare(&sub, &no_subqueries).unwrap();
        assert!(ev.test(&prepared, &scope));
    }

    #[test]
    fn test_between_and_arithmetic() {
        let row = album();
        assert!(check("year BETWEEN 1990 AND 1999", &row));
        assert!(check("year NOT BETWEEN 2000 AND 2010", &row));
        assert!(check("year + 1 = 1995", &row));
        assert!(check("year % 2 = 0", &row));
        assert!(!check("year / 0 = 0", &row));
        assert!(check("title || '!' = 'Parklife!'", &row));
    }

    #[test]
    fn test_missing_join_side_is_null() {
        let row = album();
        let mut ev = Evaluator::new();
        let expr = ev.prepare(&rsql::parse("artist.name IS NULL").unwrap(), &no_subqueries).unwrap();
        assert!(ev.test(&expr, &vec![("me", Some(&row)), ("artist", None)]));
    }

    #[test]
    fn test_subquery_values_are_inlined() {
        let row = album();
        let expr = Expr::InSubquery {
            expr: Box::new(Expr::col("year")),
            query: Box::new(SelectSpec::new("album")),
            negated: false,
        };
        let years = |_: &SelectSpec| -> Result<Vec<Row>> { Ok(vec![Row::new().with("year", 1994i64)]) };
        let mut ev = Evaluator::new();
        let prepared = ev.prepare(&expr, &years).unwrap();
        assert!(matches!(prepared, Expr::In { ref values, .. } if values.len() == 1));
        assert!(ev.test(&prepared, &vec![("me", Some(&row))]));
    }

    #[test]
    fn test_unbound_param_rejected() {
        let mut ev = Evaluator::new();
        let expr = rsql::parse("year = ?").unwrap();
        assert!(matches!(ev.prepare(&expr, &no_subqueries), Err(Error::QueryError { .. })));
    }
}
