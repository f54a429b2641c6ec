use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

/// Comparison operators accepted by the grammar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Co,
    Sw,
    Ew,
    In,
    Pr,
}

impl Operator {
    /// Parse an operator keyword, ignoring case.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let op = match keyword.to_ascii_lowercase().as_str() {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "lt" => Operator::Lt,
            "le" => Operator::Le,
            "gt" => Operator::Gt,
            "ge" => Operator::Ge,
            "co" => Operator::Co,
            "sw" => Operator::Sw,
            "ew" => Operator::Ew,
            "in" => Operator::In,
            "pr" => Operator::Pr,
            _ => return None,
        };
        Some(op)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Co => "co",
            Operator::Sw => "sw",
            Operator::Ew => "ew",
            Operator::In => "in",
            Operator::Pr => "pr",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Parsed targeting query. Only built to prove the query is well formed;
/// evaluation happens in the downstream runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        attribute: String,
        op: Operator,
        value: Literal,
    },
    In {
        attribute: String,
        values: Vec<Literal>,
    },
    Present {
        attribute: String,
    },
}

impl Expr {
    /// Attribute paths referenced anywhere in the expression, in order of
    /// first appearance.
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Or(items) | Expr::And(items) => {
                for item in items {
                    item.collect_attributes(out);
                }
            }
            Expr::Not(inner) => inner.collect_attributes(out),
            Expr::Compare { attribute, .. }
            | Expr::In { attribute, .. }
            | Expr::Present { attribute } => {
                if !out.contains(&attribute.as_str()) {
                    out.push(attribute);
                }
            }
        }
    }
}
