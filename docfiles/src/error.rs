use std::ops::Range;
use std::path::PathBuf;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use docscript::parser::ParseError;
use interpreter::DiagnosticError;

/// A documentation file could not be turned into items. Affects only that file.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}:{line}: invalid block annotation: {message}", .path.display())]
    Annotation {
        path: PathBuf,
        /// 1-based line of the opening fence.
        line: usize,
        /// Byte range of the opening fence line.
        span: Range<usize>,
        message: String,
    },
}

impl CollectionError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            CollectionError::Read { path, .. } | CollectionError::Annotation { path, .. } => path,
        }
    }

    /// Diagnostic pointing at the offending fence, for errors that have one.
    pub fn to_diagnostic(&self, file_id: usize) -> Option<Diagnostic<usize>> {
        match self {
            CollectionError::Annotation { span, message, .. } => Some(
                Diagnostic::new(Severity::Error)
                    .with_message("invalid block annotation")
                    .with_labels(vec![
                        Label::primary(file_id, span.clone()).with_message(message.clone()),
                    ])
                    .with_notes(vec![
                        "annotations are JSON objects with keys `name`, `scope`, `fixtures`, `skip`"
                            .to_string(),
                    ]),
            ),
            CollectionError::Read { .. } => None,
        }
    }
}

/// A named external value could not be provided.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("fixture '{0}' not found")]
    Unknown(String),
    #[error("fixture '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Why a code section's run phase failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunFailure {
    /// The block text does not parse. Lines are relative to the block.
    #[error("SyntaxError: {0}")]
    Syntax(ParseError),
    /// The block raised. Frames are as the interpreter recorded them.
    #[error("{0}")]
    Raised(DiagnosticError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
