//! Sieve (RFC 5228) script sources, lexer, parser and AST.

mod ast;
mod diag;
mod lexer;
mod parser;
mod script;

pub use ast::{ArgValue, Argument, Ast, Node, NodeId, NodeKind};
pub use diag::{Diagnostic, Diagnostics, Location, Severity};
pub use lexer::{LexError, Lexer, Token};
pub use parser::{Parser, parse};
pub use script::{Script, ScriptError};
