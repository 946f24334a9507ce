use std::path::{Path, PathBuf};

use docscript::Program;
use docscript::parser::{ParseError, Parser};
use docscript::rewrite::Instrument;

/// A parsed, instrumented program attributed to a source path.
#[derive(Debug)]
pub struct Code {
    pub program: Program,
    /// Path reported in tracebacks for frames executing this code.
    pub path: PathBuf,
}

impl Code {
    /// Parse `source`, apply `instrument`, and attribute positions to `path`.
    pub fn compile(
        source: &str,
        path: impl Into<PathBuf>,
        instrument: &dyn Instrument,
    ) -> Result<Code, ParseError> {
        let program = Parser::new(source, 0).parse()?;
        Ok(Code {
            program: instrument.instrument(program),
            path: path.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Text of a 1-based line with surrounding whitespace removed.
    pub fn line_text(&self, line: usize) -> Option<String> {
        let text = self.program.source.lines().nth(line.checked_sub(1)?)?.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}
