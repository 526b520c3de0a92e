//! The MOO language front-end: a hand-written lexer and recursive-descent
//! parser producing the tree the interpreter walks. There is no code
//! generation; the AST itself is the executable (and cacheable) unit.

mod ast;
mod lex;
mod parse;

pub use ast::{
    Arg, BinaryOp, CatchCodes, CondArm, ExceptArm, Expr, Program, ScatterItem, ScatterKind, Stmt,
    StmtNode, UnaryOp,
};
pub use parse::parse_program;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },
    #[error("Unterminated string literal at line {0}")]
    UnterminatedString(usize),
    #[error("Malformed number at line {0}")]
    BadNumber(usize),
}

/// Compile verb source into its AST. The result is what the store caches
/// against the verb, wrapped in an `Arc` by the caller.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let tokens = lex::lex(source)?;
    parse_program(tokens)
}
