pub mod ast;
pub mod cache;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod token_stream;
pub mod watcher;

use std::time::Instant;

use log::debug;

use crate::config::DEFAULT_CONTEXT_RADIUS;
use crate::error::{Diagnostic, SyntaxError, TplError};
use crate::source::Source;

pub use ast::Tree;
pub use expr::parse_expr;
pub use lexer::{tokenize, tokenize_expression};
pub use parser::parse;
pub use token::{Token, TokenKind};
pub use token_stream::TokenStream;

/// Lexes and parses `source` in one go.
///
/// Any failure comes back as [`TplError::Syntax`] carrying the source
/// identity, the line and a window of surrounding lines.
pub fn compile(source: &Source) -> crate::Result<Tree> {
    compile_with(source, DEFAULT_CONTEXT_RADIUS)
}

/// Like [`compile`], with `radius` context lines on each side of an error.
pub fn compile_with(source: &Source, radius: usize) -> crate::Result<Tree> {
    let start = Instant::now();
    let result = tokenize(source)
        .map_err(SyntaxError::from)
        .and_then(|stream| parse(stream).map_err(SyntaxError::from));
    let elapsed = start.elapsed().as_millis();

    match result {
        Ok(tree) => {
            debug!(
                "Compile: template={}, statements={}, elapsed={}ms",
                source.identity(),
                tree.statements.len(),
                elapsed
            );
            Ok(tree)
        }
        Err(cause) => {
            debug!(
                "Compile: template={}, elapsed={}ms, error={}",
                source.identity(),
                elapsed,
                cause
            );
            Err(TplError::Syntax(Diagnostic::new(source, cause, radius)))
        }
    }
}
