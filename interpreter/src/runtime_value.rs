use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use docscript::ast::FunctionDef;

use crate::code::Code;
use crate::error::RuntimeError;
use crate::namespace::Namespace;

/// A runtime value produced by evaluating an expression.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<RuntimeValue>>>),
    Tuple(Rc<Vec<RuntimeValue>>),
    Dict(Rc<RefCell<Dict>>),
    /// A filesystem path (`pathlib.Path`, `tmp_path`).
    Path(PathBuf),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Module(Rc<Module>),
    /// An exception class such as `ValueError`, callable to build an instance.
    ExceptionType(String),
    Exception(Rc<ExceptionValue>),
}

/// A user-defined function closed over the namespaces it was defined in.
#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    /// Evaluated default per parameter, `None` where the parameter has no default.
    pub defaults: Vec<Option<RuntimeValue>>,
    pub globals: Namespace,
    /// Local namespaces of enclosing functions, outermost first.
    pub enclosing: Vec<Namespace>,
    /// Compiled unit the function body belongs to (for tracebacks).
    pub code: Rc<Code>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: RuntimeValue,
    pub name: String,
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub namespace: Namespace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionValue {
    pub kind: String,
    pub message: String,
}

/// Functions implemented by the interpreter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Repr,
    Int,
    Float,
    Bool,
    Range,
    List,
    Tuple,
    Dict,
    Sorted,
    Min,
    Max,
    Sum,
    Abs,
    Enumerate,
    Zip,
    Path,
    Getenv,
    Getcwd,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Repr => "repr",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::Range => "range",
            Builtin::List => "list",
            Builtin::Tuple => "tuple",
            Builtin::Dict => "dict",
            Builtin::Sorted => "sorted",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Abs => "abs",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Path => "Path",
            Builtin::Getenv => "getenv",
            Builtin::Getcwd => "getcwd",
        }
    }
}

/// Insertion-ordered mapping. Lookups are linear; dicts in documentation
/// snippets are small.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(RuntimeValue, RuntimeValue)>,
}

impl Dict {
    pub fn new() -> Self {
        Dict::default()
    }

    pub fn get(&self, key: &RuntimeValue) -> Option<&RuntimeValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: RuntimeValue, value: RuntimeValue) -> Result<(), RuntimeError> {
        key.check_hashable()?;
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &RuntimeValue) -> Option<RuntimeValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &RuntimeValue) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RuntimeValue, RuntimeValue)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> Vec<RuntimeValue> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<RuntimeValue> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}

impl RuntimeValue {
    pub fn str(s: impl Into<String>) -> Self {
        RuntimeValue::Str(s.into())
    }

    pub fn list(items: Vec<RuntimeValue>) -> Self {
        RuntimeValue::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<RuntimeValue>) -> Self {
        RuntimeValue::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Self {
        RuntimeValue::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn exception(kind: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeValue::Exception(Rc::new(ExceptionValue {
            kind: kind.into(),
            message: message.into(),
        }))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            RuntimeValue::None => false,
            RuntimeValue::Bool(b) => *b,
            RuntimeValue::Int(n) => *n != 0,
            RuntimeValue::Float(f) => *f != 0.0,
            RuntimeValue::Str(s) => !s.is_empty(),
            RuntimeValue::List(items) => !items.borrow().is_empty(),
            RuntimeValue::Tuple(items) => !items.is_empty(),
            RuntimeValue::Dict(dict) => !dict.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::None => "NoneType",
            RuntimeValue::Bool(_) => "bool",
            RuntimeValue::Int(_) => "int",
            RuntimeValue::Float(_) => "float",
            RuntimeValue::Str(_) => "str",
            RuntimeValue::List(_) => "list",
            RuntimeValue::Tuple(_) => "tuple",
            RuntimeValue::Dict(_) => "dict",
            RuntimeValue::Path(_) => "PosixPath",
            RuntimeValue::Function(_) => "function",
            RuntimeValue::Builtin(_) => "builtin_function_or_method",
            RuntimeValue::Method(_) => "method",
            RuntimeValue::Module(_) => "module",
            RuntimeValue::ExceptionType(_) => "type",
            RuntimeValue::Exception(_) => "exception",
        }
    }

    /// Numeric view used by arithmetic; bools count as integers.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RuntimeValue::Int(n) => Some(*n),
            RuntimeValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            RuntimeValue::Float(f) => Some(*f),
            other => other.as_int().map(|n| n as f64),
        }
    }

    pub fn check_hashable(&self) -> Result<(), RuntimeError> {
        match self {
            RuntimeValue::List(_) | RuntimeValue::Dict(_) => Err(RuntimeError::TypeError(format!(
                "unhashable type: '{}'",
                self.type_name()
            ))),
            RuntimeValue::Tuple(items) => items.iter().try_for_each(RuntimeValue::check_hashable),
            _ => Ok(()),
        }
    }

    /// The `repr()` of a value.
    pub fn repr(&self) -> String {
        match self {
            RuntimeValue::Str(s) => quote(s),
            RuntimeValue::List(items) => format!("[{}]", join_repr(items.borrow().iter())),
            RuntimeValue::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            RuntimeValue::Tuple(items) => format!("({})", join_repr(items.iter())),
            RuntimeValue::Dict(dict) => {
                let entries: Vec<String> = dict
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            RuntimeValue::Path(path) => format!("PosixPath({})", quote(&path.to_string_lossy())),
            RuntimeValue::Exception(e) => format!("{}({})", e.kind, quote(&e.message)),
            other => other.to_string(),
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=` and `sorted`; `None` when the
    /// operands are not comparable.
    pub fn compare(&self, other: &RuntimeValue) -> Option<Ordering> {
        match (self, other) {
            (RuntimeValue::Str(a), RuntimeValue::Str(b)) => Some(a.cmp(b)),
            (RuntimeValue::List(a), RuntimeValue::List(b)) => {
                compare_sequences(&a.borrow(), &b.borrow())
            }
            (RuntimeValue::Tuple(a), RuntimeValue::Tuple(b)) => compare_sequences(a, b),
            (RuntimeValue::Path(a), RuntimeValue::Path(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_float()?.partial_cmp(&b.as_float()?),
            },
        }
    }

    /// Identity as observed by `is`.
    pub fn is_identical(&self, other: &RuntimeValue) -> bool {
        match (self, other) {
            (RuntimeValue::None, RuntimeValue::None) => true,
            (RuntimeValue::Bool(a), RuntimeValue::Bool(b)) => a == b,
            (RuntimeValue::Int(a), RuntimeValue::Int(b)) => a == b,
            (RuntimeValue::Str(a), RuntimeValue::Str(b)) => a == b,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Tuple(a), RuntimeValue::Tuple(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Dict(a), RuntimeValue::Dict(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Function(a), RuntimeValue::Function(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Module(a), RuntimeValue::Module(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Exception(a), RuntimeValue::Exception(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::ExceptionType(a), RuntimeValue::ExceptionType(b)) => a == b,
            (RuntimeValue::Builtin(a), RuntimeValue::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

fn compare_sequences(a: &[RuntimeValue], b: &[RuntimeValue]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if x != y {
            return x.compare(y);
        }
    }
    Some(a.len().cmp(&b.len()))
}

fn join_repr<'a>(items: impl Iterator<Item = &'a RuntimeValue>) -> String {
    items.map(RuntimeValue::repr).collect::<Vec<_>>().join(", ")
}

/// Quote a string the way `repr` does: single quotes unless the text
/// contains a single quote and no double quote.
pub fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f == f64::INFINITY {
        "inf".to_string()
    } else if f == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if f == f.trunc() && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// `str()` of a value.
impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::None => write!(f, "None"),
            RuntimeValue::Bool(true) => write!(f, "True"),
            RuntimeValue::Bool(false) => write!(f, "False"),
            RuntimeValue::Int(n) => write!(f, "{}", n),
            RuntimeValue::Float(x) => write!(f, "{}", format_float(*x)),
            RuntimeValue::Str(s) => write!(f, "{}", s),
            RuntimeValue::Path(path) => write!(f, "{}", path.display()),
            RuntimeValue::Function(func) => write!(f, "<function {}>", func.def.name),
            RuntimeValue::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            RuntimeValue::Method(m) => write!(
                f,
                "<bound method {}.{}>",
                m.receiver.type_name(),
                m.name
            ),
            RuntimeValue::Module(m) => write!(f, "<module '{}'>", m.name),
            RuntimeValue::ExceptionType(kind) => write!(f, "<class '{}'>", kind),
            RuntimeValue::Exception(e) => write!(f, "{}", e.message),
            RuntimeValue::List(_) | RuntimeValue::Tuple(_) | RuntimeValue::Dict(_) => {
                write!(f, "{}", self.repr())
            }
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::None, RuntimeValue::None) => true,
            (RuntimeValue::Str(a), RuntimeValue::Str(b)) => a == b,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (RuntimeValue::Tuple(a), RuntimeValue::Tuple(b)) => a == b,
            (RuntimeValue::Dict(a), RuntimeValue::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (RuntimeValue::Path(a), RuntimeValue::Path(b)) => a == b,
            (RuntimeValue::Function(a), RuntimeValue::Function(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Method(a), RuntimeValue::Method(b)) => {
                a.name == b.name && a.receiver.is_identical(&b.receiver)
            }
            (RuntimeValue::Module(a), RuntimeValue::Module(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Builtin(a), RuntimeValue::Builtin(b)) => a == b,
            (RuntimeValue::ExceptionType(a), RuntimeValue::ExceptionType(b)) => a == b,
            (RuntimeValue::Exception(a), RuntimeValue::Exception(b)) => Rc::ptr_eq(a, b),
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a.as_float(), b.as_float()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_matches_python() {
        assert_eq!(RuntimeValue::str("A").repr(), "'A'");
        assert_eq!(RuntimeValue::str("it's").repr(), "\"it's\"");
        assert_eq!(RuntimeValue::Float(1.0).repr(), "1.0");
        assert_eq!(RuntimeValue::Float(0.5).repr(), "0.5");
        assert_eq!(RuntimeValue::tuple(vec![RuntimeValue::Int(1)]).repr(), "(1,)");
        assert_eq!(
            RuntimeValue::list(vec![RuntimeValue::None, RuntimeValue::Bool(true)]).repr(),
            "[None, True]"
        );
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert_eq!(RuntimeValue::Int(1), RuntimeValue::Float(1.0));
        assert_eq!(RuntimeValue::Bool(true), RuntimeValue::Int(1));
        assert_ne!(RuntimeValue::Int(1), RuntimeValue::str("1"));
    }

    #[test]
    fn dict_equality_ignores_order() {
        let mut a = Dict::new();
        a.insert(RuntimeValue::str("x"), RuntimeValue::Int(1)).unwrap();
        a.insert(RuntimeValue::str("y"), RuntimeValue::Int(2)).unwrap();
        let mut b = Dict::new();
        b.insert(RuntimeValue::str("y"), RuntimeValue::Int(2)).unwrap();
        b.insert(RuntimeValue::str("x"), RuntimeValue::Int(1)).unwrap();
        assert_eq!(RuntimeValue::dict(a), RuntimeValue::dict(b));
    }

    #[test]
    fn lists_are_unhashable() {
        let mut d = Dict::new();
        let err = d
            .insert(RuntimeValue::list(vec![]), RuntimeValue::None)
            .unwrap_err();
        assert_eq!(err.to_string(), "unhashable type: 'list'");
    }
}
