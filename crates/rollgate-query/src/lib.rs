//! Targeting query syntax for rollgate.
//!
//! Queries attached to targeting rules use a small boolean grammar:
//! `field OP value`, combined with `and` / `or` / `not` and parentheses.
//! Operators are `eq ne lt le gt ge co sw ew in pr`; `in` takes a list
//! literal and `pr` takes no value.
//!
//! This crate only decides whether a query is well formed. Matching a query
//! against an evaluation context belongs to the downstream runtime.
//!
//! ```
//! use rollgate_query::check_syntax;
//!
//! assert!(check_syntax(r#"plan eq "premium" and country in ["US", "CA"]"#).is_ok());
//! assert!(check_syntax(r#"plan equals "premium""#).is_err());
//! ```
pub mod ast;
pub mod parser;

pub use ast::{Expr, Literal, Operator};
pub use parser::{check_syntax, parse_query, SyntaxError};
