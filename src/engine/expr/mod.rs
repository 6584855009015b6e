//! Query expression parsing for rule `expr` fields.
//!
//! Rule validation only needs a yes/no answer from a parser, so the
//! validator is written against [`ExpressionParser`] and any implementation
//! can be plugged in. [`QueryParser`] is the bundled one; it understands
//! series selectors, log stream selectors with pipelines, function calls,
//! aggregations and binary operators with vector matching.

pub mod ast;
pub mod lexer;
pub mod parser;

use thiserror::Error;

pub use ast::Expr;
pub use parser::QueryParser;

/// Parser contract consumed by rule validation. Only the error is inspected.
pub trait ExpressionParser {
    type Ast;

    fn parse(&self, input: &str) -> Result<Self::Ast, ExprError>;
}

impl<P: ExpressionParser + ?Sized> ExpressionParser for &P {
    type Ast = P::Ast;

    fn parse(&self, input: &str) -> Result<Self::Ast, ExprError> {
        (**self).parse(input)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("parse error at line {line}, col {column}: {message}")]
pub struct ExprError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ExprError {
    /// Builds an error pointing at byte `offset` of `input`.
    pub fn at(input: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(input.len());
        let prefix = input.get(..offset).unwrap_or(input);
        let line = prefix.matches('\n').count() + 1;
        let line_start = prefix.rfind('\n').map_or(0, |index| index + 1);
        let column = prefix[line_start..].chars().count() + 1;
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}
