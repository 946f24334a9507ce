use std::rc::Rc;

use crate::namespace::Namespace;
use crate::runtime_value::{Builtin, Dict, Module, RuntimeValue};

/// Modules provided by the interpreter itself. `None` for anything else.
pub fn builtin_module(name: &str) -> Option<RuntimeValue> {
    let namespace = Namespace::new();
    match name {
        "os" => {
            namespace.set("environ", environ());
            namespace.set("getenv", RuntimeValue::Builtin(Builtin::Getenv));
            namespace.set("getcwd", RuntimeValue::Builtin(Builtin::Getcwd));
        }
        "pathlib" => {
            namespace.set("Path", RuntimeValue::Builtin(Builtin::Path));
        }
        _ => return None,
    }
    namespace.set("__name__", RuntimeValue::str(name));
    Some(RuntimeValue::Module(Rc::new(Module {
        name: name.to_string(),
        namespace,
    })))
}

/// Snapshot of the process environment as a dict of strings.
pub fn environ() -> RuntimeValue {
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    vars.sort();
    let mut dict = Dict::new();
    for (key, value) in vars {
        // String keys are always hashable.
        let _ = dict.insert(RuntimeValue::Str(key), RuntimeValue::Str(value));
    }
    RuntimeValue::dict(dict)
}
