//! Condition parser using nom
//!
//! Parses the textual condition syntax accepted by `search_str` into [`Expr`]
//! trees, plus ORDER BY and column lists.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, digit1, multispace0, multispace1, none_of, satisfy},
    combinator::{map, map_res, not, opt, recognize, value, verify},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::ast::*;
use crate::error::ParseError;

/// Words that can never be used as bare identifiers
const KEYWORDS: &[&str] = &[
    "and", "or", "not", "is", "null", "like", "in", "between", "true", "false", "asc", "desc",
];

/// Parse a complete condition
pub fn parse_condition(input: &str) -> Result<Expr, ParseError> {
    let (remaining, mut parsed) = delimited(multispace0, expr, multispace0)(input)
        .map_err(|e| ParseError::from_nom(input, e))?;
    ensure_consumed(input, remaining)?;
    number_params(&mut parsed, &mut 0);
    Ok(parsed)
}

/// Parse `col [ASC|DESC], ...`
pub fn parse_order_by(input: &str) -> Result<Vec<OrderBy>, ParseError> {
    let (remaining, items) = delimited(multispace0, order_by_list, multispace0)(input)
        .map_err(|e| ParseError::from_nom(input, e))?;
    ensure_consumed(input, remaining)?;
    Ok(items)
}

/// Parse `col, rel.col, ...`
pub fn parse_columns(input: &str) -> Result<Vec<ColumnRef>, ParseError> {
    let (remaining, cols) = delimited(multispace0, separated_list1(comma, column_ref), multispace0)(input)
        .map_err(|e| ParseError::from_nom(input, e))?;
    ensure_consumed(input, remaining)?;
    Ok(cols)
}

fn ensure_consumed(input: &str, remaining: &str) -> Result<(), ParseError> {
    if remaining.is_empty() {
        Ok(())
    } else {
        Err(ParseError::new(format!("Unexpected trailing content: {}", remaining.trim()))
            .with_position(input.len() - remaining.len()))
    }
}

/// Assign `?` placeholders their position, left to right
fn number_params(expr: &mut Expr, next: &mut usize) {
    match expr {
        Expr::Param(i) => {
            *i = *next;
            *next += 1;
        }
        Expr::Literal(_) | Expr::Column(_) => {}
        Expr::BinaryOp { left, right, .. } => {
            number_params(left, next);
            number_params(right, next);
        }
        Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::InSubquery { expr, .. } => {
            number_params(expr, next)
        }
        Expr::Like { expr, pattern, .. } => {
            number_params(expr, next);
            number_params(pattern, next);
        }
        Expr::In { expr, values, .. } => {
            number_params(expr, next);
            for v in values {
                number_params(v, next);
            }
        }
        Expr::Between { expr, low, high, .. } => {
            number_params(expr, next);
            number_params(low, next);
            number_params(high, next);
        }
    }
}

// ============================================================================
// Boolean structure
// ============================================================================

fn expr(input: &str) -> IResult<&str, Expr> {
    or_expr(input)
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(
        delimited(multispace0, keyword("OR"), multispace0),
        and_expr,
    ))(input)?;

    Ok((input, fold_binary(first, BinaryOp::Or, rest)))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(
        delimited(multispace0, keyword("AND"), multispace0),
        not_expr,
    ))(input)?;

    Ok((input, fold_binary(first, BinaryOp::And, rest)))
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(pair(keyword("NOT"), multispace0), not_expr),
            Expr::not,
        ),
        comparison,
    ))(input)
}

fn fold_binary(first: Expr, op: BinaryOp, rest: Vec<Expr>) -> Expr {
    rest.into_iter().fold(first, |acc, e| Expr::binary(acc, op, e))
}

// ============================================================================
// Comparisons
// ============================================================================

/// What follows the left operand of a comparison
#[derive(Debug, Clone)]
enum Suffix {
    IsNull(bool),
    Like(Expr, bool),
    In(Vec<Expr>, bool),
    Between(Expr, Expr, bool),
    Compare(BinaryOp, Expr),
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, left) = additive(input)?;
    let (input, suffix) = opt(alt((is_null_suffix, like_suffix, in_suffix, between_suffix, compare_suffix)))(input)?;

    let left = Box::new(left);
    let expr = match suffix {
        None => *left,
        Some(Suffix::IsNull(negated)) => Expr::IsNull { expr: left, negated },
        Some(Suffix::Like(pattern, negated)) => Expr::Like {
            expr: left,
            pattern: Box::new(pattern),
            negated,
        },
        Some(Suffix::In(values, negated)) => Expr::In { expr: left, values, negated },
        Some(Suffix::Between(low, high, negated)) => Expr::Between {
            expr: left,
            low: Box::new(low),
            high: Box::new(high),
            negated,
        },
        Some(Suffix::Compare(op, right)) => Expr::BinaryOp { left, op, right: Box::new(right) },
    };
    Ok((input, expr))
}

fn negation(input: &str) -> IResult<&str, bool> {
    map(opt(terminated(keyword("NOT"), multispace1)), |n| n.is_some())(input)
}

fn is_null_suffix(input: &str) -> IResult<&str, Suffix> {
    let (input, _) = preceded(multispace1, keyword("IS"))(input)?;
    let (input, _) = multispace1(input)?;
    let (input, negated) = negation(input)?;
    let (input, _) = keyword("NULL")(input)?;
    Ok((input, Suffix::IsNull(negated)))
}

fn like_suffix(input: &str) -> IResult<&str, Suffix> {
    let (input, _) = multispace1(input)?;
    let (input, negated) = negation(input)?;
    let (input, _) = keyword("LIKE")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, pattern) = alt((
        map(string_literal, |s| Expr::Literal(Literal::String(s))),
        value(Expr::Param(0), char('?')),
    ))(input)?;
    Ok((input, Suffix::Like(pattern, negated)))
}

fn in_suffix(input: &str) -> IResult<&str, Suffix> {
    let (input, _) = multispace1(input)?;
    let (input, negated) = negation(input)?;
    let (input, _) = keyword("IN")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, values) = delimited(
        pair(char('('), multispace0),
        separated_list1(comma, additive),
        pair(multispace0, char(')')),
    )(input)?;
    Ok((input, Suffix::In(values, negated)))
}

fn between_suffix(input: &str) -> IResult<&str, Suffix> {
    let (input, _) = multispace1(input)?;
    let (input, negated) = negation(input)?;
    let (input, _) = keyword("BETWEEN")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, low) = additive(input)?;
    let (input, _) = delimited(multispace0, keyword("AND"), multispace0)(input)?;
    let (input, high) = additive(input)?;
    Ok((input, Suffix::Between(low, high, negated)))
}

fn compare_suffix(input: &str) -> IResult<&str, Suffix> {
    let (input, (_, op, _, right)) = tuple((
        multispace0,
        alt((
            value(BinaryOp::Eq, tag("=")),
            value(BinaryOp::Ne, alt((tag("!="), tag("<>")))),
            value(BinaryOp::Le, tag("<=")),
            value(BinaryOp::Lt, tag("<")),
            value(BinaryOp::Ge, tag(">=")),
            value(BinaryOp::Gt, tag(">")),
        )),
        multispace0,
        additive,
    ))(input)?;
    Ok((input, Suffix::Compare(op, right)))
}

// ============================================================================
// Arithmetic
// ============================================================================

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = multiplicative(input)?;
    let (input, rest) = many0(pair(
        delimited(
            multispace0,
            alt((
                value(BinaryOp::Concat, tag("||")),
                value(BinaryOp::Add, tag("+")),
                value(BinaryOp::Sub, tag("-")),
            )),
            multispace0,
        ),
        multiplicative,
    ))(input)?;

    Ok((input, rest.into_iter().fold(first, |acc, (op, e)| Expr::binary(acc, op, e))))
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        delimited(
            multispace0,
            alt((
                value(BinaryOp::Mul, char('*')),
                value(BinaryOp::Div, char('/')),
                value(BinaryOp::Mod, char('%')),
            )),
            multispace0,
        ),
        unary,
    ))(input)?;

    Ok((input, rest.into_iter().fold(first, |acc, (op, e)| Expr::binary(acc, op, e))))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(pair(char('-'), multispace0), unary), |e| match e {
            Expr::Literal(Literal::Int(i)) => Expr::Literal(Literal::Int(-i)),
            Expr::Literal(Literal::Float(f)) => Expr::Literal(Literal::Float(-f)),
            other => Expr::UnaryOp {
                op: UnaryOp::Neg,
                expr: Box::new(other),
            },
        }),
        primary,
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    alt((
        delimited(
            pair(char('('), multispace0),
            expr,
            pair(multispace0, char(')')),
        ),
        map(literal, Expr::Literal),
        value(Expr::Param(0), char('?')),
        map(column_ref, Expr::Column),
    ))(input)
}

// ============================================================================
// ORDER BY
// ============================================================================

fn order_by_list(input: &str) -> IResult<&str, Vec<OrderBy>> {
    separated_list1(comma, order_by_item)(input)
}

fn order_by_item(input: &str) -> IResult<&str, OrderBy> {
    let (input, column) = column_ref(input)?;
    let (input, dir) = opt(preceded(
        multispace1,
        alt((
            value(OrderDirection::Asc, keyword("ASC")),
            value(OrderDirection::Desc, keyword("DESC")),
        )),
    ))(input)?;

    Ok((input, OrderBy {
        column,
        direction: dir.unwrap_or_default(),
    }))
}

// ============================================================================
// Primitives
// ============================================================================

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Case-insensitive keyword that is not the prefix of a longer word
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(kw), not(satisfy(is_ident_char)))
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    verify(
        recognize(pair(
            satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(is_ident_char),
        )),
        |s: &str| !KEYWORDS.contains(&s.to_ascii_lowercase().as_str()),
    )(input)
}

fn column_ref(input: &str) -> IResult<&str, ColumnRef> {
    let (input, first) = identifier(input)?;
    let (input, second) = opt(preceded(char('.'), identifier))(input)?;
    let column = match second {
        Some(col) if first == BASE_ALIAS => ColumnRef::new(col),
        Some(col) => ColumnRef::qualified(first, col),
        None => ColumnRef::new(first),
    };
    Ok((input, column))
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        value(Literal::Null, keyword("NULL")),
        value(Literal::Bool(true), keyword("TRUE")),
        value(Literal::Bool(false), keyword("FALSE")),
        map(float_literal, Literal::Float),
        map(integer_literal, Literal::Int),
        map(string_literal, Literal::String),
    ))(input)
}

fn integer_literal(input: &str) -> IResult<&str, i64> {
    map_res(terminated(digit1, not(satisfy(is_ident_char))), |s: &str| s.parse::<i64>())(input)
}

fn float_literal(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((digit1, char('.'), digit1))),
        |s: &str| s.parse::<f64>(),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        map(
            many0(alt((
                value('\'', tag("''")),
                none_of("'"),
            ))),
            |chars| chars.into_iter().collect(),
        ),
        char('\''),
    )(input)
}
