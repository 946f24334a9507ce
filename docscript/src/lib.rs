pub mod ast;
pub mod parser;
pub mod rewrite;

use crate::ast::Stmt;

/// A parsed code block (or imported module) ready for execution.
#[derive(Debug, Clone)]
pub struct Program {
    /// Top-level statements in source order.
    pub body: Vec<Stmt>,
    /// The text the program was parsed from. Spans index into it.
    pub source: String,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Program {
    /// Source text covered by `span`, or an empty string if the span is out of range.
    pub fn text(&self, span: &std::ops::Range<usize>) -> &str {
        self.source.get(span.clone()).unwrap_or("")
    }
}
