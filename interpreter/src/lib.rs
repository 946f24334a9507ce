pub mod builtins;
pub mod code;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod explain;
mod methods;
pub mod modules;
pub mod namespace;
pub mod runtime_value;
pub mod traceback;

pub use code::Code;
pub use error::{DiagnosticError, RuntimeError};
pub use executor::{Interpreter, MAX_DEPTH};
pub use namespace::Namespace;
pub use runtime_value::RuntimeValue;
pub use traceback::Frame;
