use crate::ast::{Expr, Literal, Operator};
use pest::error::{ErrorVariant, LineColLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "query.pest"]
struct QueryParser;

/// A malformed targeting query. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    fn at(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    fn at_pair(pair: &Pair<'_, Rule>, message: impl Into<String>) -> Self {
        let (line, column) = pair.as_span().start_pos().line_col();
        Self::at(line, column, message)
    }
}

impl From<pest::error::Error<Rule>> for SyntaxError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        let message = match &err.variant {
            ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
                let mut expected: Vec<&str> = positives.iter().map(describe_rule).collect();
                expected.sort_unstable();
                expected.dedup();
                format!("expected {}", join_alternatives(&expected))
            }
            ErrorVariant::ParsingError { .. } => "unexpected input".to_string(),
            ErrorVariant::CustomError { message } => message.clone(),
        };
        SyntaxError::at(line, column, message)
    }
}

fn describe_rule(rule: &Rule) -> &'static str {
    match rule {
        Rule::path => "attribute name",
        Rule::cmp_op | Rule::in_op | Rule::pr_op => "operator",
        Rule::and_op | Rule::or_op => "'and' or 'or'",
        Rule::not_op => "'not'",
        Rule::string_lit | Rule::number_lit | Rule::bool_lit | Rule::null_lit => "value",
        Rule::list => "list literal",
        Rule::EOI => "end of query",
        _ => "expression",
    }
}

fn join_alternatives(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}

/// Parse a targeting query into its expression tree.
pub fn parse_query(input: &str) -> Result<Expr, SyntaxError> {
    if input.trim().is_empty() {
        return Err(SyntaxError::at(1, 1, "query is empty"));
    }

    let mut pairs = QueryParser::parse(Rule::query, input)?;
    let query = pairs
        .next()
        .ok_or_else(|| SyntaxError::at(1, 1, "query is empty"))?;
    let expr = query
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| SyntaxError::at(1, 1, "query is empty"))?;

    build_expr(expr)
}

/// Check a targeting query without keeping the parse tree.
pub fn check_syntax(input: &str) -> Result<(), SyntaxError> {
    parse_query(input).map(|_| ())
}

fn build_expr(pair: Pair<'_, Rule>) -> Result<Expr, SyntaxError> {
    match pair.as_rule() {
        Rule::expr | Rule::term => {
            let disjunction = pair.as_rule() == Rule::expr;
            let mut operands = pair
                .into_inner()
                .filter(|p| !matches!(p.as_rule(), Rule::or_op | Rule::and_op))
                .map(build_expr)
                .collect::<Result<Vec<_>, _>>()?;
            if operands.len() == 1 {
                Ok(operands.remove(0))
            } else if disjunction {
                Ok(Expr::Or(operands))
            } else {
                Ok(Expr::And(operands))
            }
        }
        Rule::negation => {
            let inner = pair
                .clone()
                .into_inner()
                .find(|p| p.as_rule() != Rule::not_op)
                .ok_or_else(|| SyntaxError::at_pair(&pair, "'not' requires an operand"))?;
            Ok(Expr::Not(Box::new(build_expr(inner)?)))
        }
        Rule::group => {
            let inner = pair
                .clone()
                .into_inner()
                .next()
                .ok_or_else(|| SyntaxError::at_pair(&pair, "empty group"))?;
            build_expr(inner)
        }
        Rule::comparison => {
            let mut inner = pair.clone().into_inner();
            let (attribute, op_pair, value) = match (inner.next(), inner.next(), inner.next()) {
                (Some(a), Some(o), Some(v)) => (a, o, v),
                _ => return Err(SyntaxError::at_pair(&pair, "incomplete comparison")),
            };
            let op = Operator::from_keyword(op_pair.as_str())
                .ok_or_else(|| SyntaxError::at_pair(&op_pair, "unknown operator"))?;
            Ok(Expr::Compare {
                attribute: attribute.as_str().to_string(),
                op,
                value: build_literal(value)?,
            })
        }
        Rule::membership => {
            let mut inner = pair.clone().into_inner();
            let attribute = inner
                .next()
                .ok_or_else(|| SyntaxError::at_pair(&pair, "missing attribute"))?;
            let list = inner
                .find(|p| p.as_rule() == Rule::list)
                .ok_or_else(|| SyntaxError::at_pair(&pair, "'in' requires a list literal"))?;
            let values = list
                .into_inner()
                .map(build_literal)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::In {
                attribute: attribute.as_str().to_string(),
                values,
            })
        }
        Rule::presence => {
            let attribute = pair
                .clone()
                .into_inner()
                .next()
                .ok_or_else(|| SyntaxError::at_pair(&pair, "missing attribute"))?;
            Ok(Expr::Present {
                attribute: attribute.as_str().to_string(),
            })
        }
        _ => Err(SyntaxError::at_pair(&pair, "unexpected token")),
    }
}

fn build_literal(pair: Pair<'_, Rule>) -> Result<Literal, SyntaxError> {
    match pair.as_rule() {
        Rule::string_lit => {
            let body = pair
                .clone()
                .into_inner()
                .next()
                .map(|p| p.as_str())
                .unwrap_or("");
            unescape(body)
                .map(Literal::Str)
                .ok_or_else(|| SyntaxError::at_pair(&pair, "invalid escape sequence"))
        }
        Rule::number_lit => pair
            .as_str()
            .parse::<f64>()
            .map(Literal::Num)
            .map_err(|_| SyntaxError::at_pair(&pair, "invalid number")),
        Rule::bool_lit => Ok(Literal::Bool(pair.as_str().eq_ignore_ascii_case("true"))),
        Rule::null_lit => Ok(Literal::Null),
        _ => Err(SyntaxError::at_pair(&pair, "expected value")),
    }
}

fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}
