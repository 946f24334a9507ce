pub mod error;
mod expression;
mod lexer;
mod statement;

pub use error::ParseError;

use crate::Program;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: impl Into<String>, file_id: usize) -> Self {
        Parser {
            source: source.into(),
            file_id,
        }
    }

    /// Parse the source text into a complete Program.
    pub fn parse(self) -> Result<Program, ParseError> {
        let tokens = lexer::Lexer::new(&self.source, self.file_id).tokenize()?;
        let body = statement::StatementParser::new(tokens, self.file_id).parse_program()?;
        Ok(Program {
            body,
            source: self.source,
            source_id: self.file_id,
        })
    }
}
