use std::fmt;

use crate::runtime_value::ExceptionValue;
use crate::traceback::Frame;

/// An exception raised while executing a program.
///
/// Each variant maps onto the exception class reported for it (see
/// [`RuntimeError::kind`]); `Display` renders the exception message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("name '{0}' is not defined")]
    UndefinedVariable(String),
    #[error("{0}")]
    TypeError(String),
    #[error("{0}")]
    ValueError(String),
    /// Holds the `repr` of the missing key.
    #[error("{0}")]
    KeyError(String),
    #[error("{0}")]
    IndexError(String),
    #[error("{0}")]
    AttributeError(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("No module named '{0}'")]
    ModuleNotFound(String),
    #[error("{0}")]
    ImportError(String),
    #[error("maximum recursion depth exceeded")]
    StackOverflow,
    #[error("[Errno 2] No such file or directory: '{0}'")]
    FileNotFound(String),
    #[error("{0}")]
    IoError(String),
    #[error("{message} ({path}, line {line})")]
    Syntax {
        message: String,
        path: String,
        line: usize,
    },
    /// A failed `assert`. `explanation` is empty for uninstrumented asserts.
    #[error("{}", .message.as_deref().unwrap_or(""))]
    Assertion {
        message: Option<String>,
        explanation: Vec<String>,
    },
    /// An exception raised explicitly by program code.
    #[error("{}", .0.message)]
    Raised(ExceptionValue),
    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    /// Exception class name.
    pub fn kind(&self) -> &str {
        match self {
            RuntimeError::UndefinedVariable(_) => "NameError",
            RuntimeError::TypeError(_) => "TypeError",
            RuntimeError::ValueError(_) => "ValueError",
            RuntimeError::KeyError(_) => "KeyError",
            RuntimeError::IndexError(_) => "IndexError",
            RuntimeError::AttributeError(_) => "AttributeError",
            RuntimeError::DivisionByZero => "ZeroDivisionError",
            RuntimeError::Overflow => "OverflowError",
            RuntimeError::ModuleNotFound(_) => "ModuleNotFoundError",
            RuntimeError::ImportError(_) => "ImportError",
            RuntimeError::StackOverflow => "RecursionError",
            RuntimeError::FileNotFound(_) => "FileNotFoundError",
            RuntimeError::IoError(_) => "OSError",
            RuntimeError::Syntax { .. } => "SyntaxError",
            RuntimeError::Assertion { .. } => "AssertionError",
            RuntimeError::Raised(e) => &e.kind,
            RuntimeError::Custom(_) => "RuntimeError",
        }
    }

    /// The value bound by `except ... as name`.
    pub fn to_exception(&self) -> ExceptionValue {
        ExceptionValue {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }

    /// Convert a raised exception value back into an error.
    pub fn from_exception(value: ExceptionValue) -> Self {
        if value.kind == "AssertionError" {
            return RuntimeError::Assertion {
                message: (!value.message.is_empty()).then_some(value.message),
                explanation: Vec::new(),
            };
        }
        RuntimeError::Raised(value)
    }

    /// Explanation lines shown beneath the headline of a failure report.
    pub fn explanation(&self) -> &[String] {
        match self {
            RuntimeError::Assertion { explanation, .. } => explanation,
            _ => &[],
        }
    }
}

/// The builtin exception classes, used to resolve names in `except` clauses
/// and calls like `ValueError('bad')`.
pub const EXCEPTION_KINDS: &[&str] = &[
    "BaseException",
    "Exception",
    "ArithmeticError",
    "LookupError",
    "AssertionError",
    "AttributeError",
    "FileNotFoundError",
    "ImportError",
    "IndexError",
    "KeyError",
    "ModuleNotFoundError",
    "NameError",
    "OSError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "SyntaxError",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

/// True if an exception of class `kind` is caught by an `except base` clause.
pub fn is_subclass(kind: &str, base: &str) -> bool {
    if kind == base || base == "BaseException" {
        return true;
    }
    let parent = match kind {
        "BaseException" => return false,
        "KeyError" | "IndexError" => "LookupError",
        "ZeroDivisionError" | "OverflowError" => "ArithmeticError",
        "FileNotFoundError" => "OSError",
        "ModuleNotFoundError" => "ImportError",
        "RecursionError" => "RuntimeError",
        "Exception" => "BaseException",
        _ => "Exception",
    };
    is_subclass(parent, base)
}

/// A runtime error enriched with the stack it propagated through.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticError {
    pub error: RuntimeError,
    /// Frames from outermost to innermost. Empty until the error first
    /// passes through a statement boundary.
    pub traceback: Vec<Frame>,
}

impl DiagnosticError {
    /// `Kind: message`, or just `Kind` when the message is empty.
    pub fn headline(&self) -> String {
        let message = self.error.to_string();
        if message.is_empty() {
            self.error.kind().to_string()
        } else {
            format!("{}: {}", self.error.kind(), message)
        }
    }
}

impl From<RuntimeError> for DiagnosticError {
    fn from(error: RuntimeError) -> Self {
        DiagnosticError {
            error,
            traceback: Vec::new(),
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.headline())
    }
}

impl std::error::Error for DiagnosticError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_hierarchy() {
        assert!(is_subclass("KeyError", "LookupError"));
        assert!(is_subclass("KeyError", "Exception"));
        assert!(is_subclass("ModuleNotFoundError", "ImportError"));
        assert!(is_subclass("CustomThing", "Exception"));
        assert!(!is_subclass("ValueError", "TypeError"));
        assert!(!is_subclass("Exception", "ValueError"));
    }

    #[test]
    fn headline_omits_empty_message() {
        let bare: DiagnosticError = RuntimeError::Assertion {
            message: None,
            explanation: Vec::new(),
        }
        .into();
        assert_eq!(bare.headline(), "AssertionError");
        let named: DiagnosticError = RuntimeError::UndefinedVariable("value".into()).into();
        assert_eq!(named.headline(), "NameError: name 'value' is not defined");
    }
}
