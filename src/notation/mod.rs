//! The model notation: a small TLA+-inspired expression language.
//!
//! Guards, requires/guarantee clauses, safety rules, invariants and attribute
//! defaults are all written in this notation. The engine only relies on two
//! entry points:
//!
//! - [`parse_expression`] turns source text into an [`Expression`] tree.
//! - [`eval`] evaluates a tree against [`Bindings`], which expose `self`,
//!   parameters, the live instances of every class and association traversal
//!   through the [`ObjectGraph`] trait.

pub mod ast;
pub mod eval;
mod lexer;
mod parser;

pub use ast::{AssignmentTarget, BinaryOp, Expression, QuantifierKind, UnaryOp};
pub use eval::{eval, Bindings, EmptyGraph, ObjectGraph};
pub use parser::parse_expression;

use thiserror::Error;

/// Errors produced while tokenizing or parsing notation source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar {
        ch: char,
        offset: usize,
    },

    #[error("unknown operator '{operator}' at offset {offset}")]
    UnknownOperator {
        operator: String,
        offset: usize,
    },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString {
        offset: usize,
    },

    #[error("invalid number literal '{text}'")]
    InvalidNumber {
        text: String,
    },

    #[error("expected {expected}, found {found} at offset {offset}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("expected {expected}, found end of input")]
    UnexpectedEnd {
        expected: &'static str,
    },

    #[error("prime must follow an identifier or field access (offset {offset})")]
    MisplacedPrime {
        offset: usize,
    },

    #[error("unexpected {found} after complete expression at offset {offset}")]
    TrailingInput {
        found: String,
        offset: usize,
    },
}

/// Errors produced while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unknown identifier '{name}'")]
    UnknownIdentifier {
        name: String,
    },

    #[error("'{field}' is neither an attribute nor an association of {target}")]
    UnknownField {
        field: String,
        target: String,
    },

    #[error("operator '{op}' cannot be applied to {found}")]
    TypeMismatch {
        op: String,
        found: String,
    },

    #[error("next-state value of '{name}' is not available here")]
    PrimedUnavailable {
        name: String,
    },

    #[error("'self' is not bound in this context")]
    NoSelf,

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("range {low}..{high} is too large to enumerate")]
    RangeTooLarge {
        low: i64,
        high: i64,
    },

    #[error("unknown function '{name}'")]
    UnknownFunction {
        name: String,
    },

    #[error("function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("function '{function}' applied to an empty collection")]
    EmptyCollection {
        function: String,
    },
}
