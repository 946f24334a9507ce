use std::fmt;
use std::path::PathBuf;

/// One entry of an exception's propagation chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// File the executing code was compiled from.
    pub path: PathBuf,
    /// 1-based line within that file's compiled text.
    pub line: usize,
    /// Function name, or `<module>` for top-level code.
    pub name: String,
    /// The source line, stripped of indentation.
    pub source_line: Option<String>,
}

/// Renders `path:line: in name` followed by the indented source line.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: in {}", self.path.display(), self.line, self.name)?;
        if let Some(source) = &self.source_line {
            write!(f, "\n    {}", source)?;
        }
        Ok(())
    }
}
