//! Parameter expression language
//!
//! Circuit definitions embed small expressions in strings using `${...}`:
//! port sizes (`"${WIDTH}"`), loop-generated ids (`"reg_${i}"`), connection
//! strings (`"reg_${i-1}.out"`) and conditional output mappings. Expressions
//! are parsed into a restricted AST and interpreted directly.

pub mod ast;
mod eval;
mod grammar;
pub mod lexer;

pub use ast::{BinaryOp, Expr, Params, Span, UnaryOp, Value};
pub use eval::{eval, Evaluator, Scope};
pub use grammar::parse_expression;
