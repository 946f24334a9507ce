use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::runtime_value::RuntimeValue;

/// A mutable name → value mapping with shared ownership.
///
/// Cloning a `Namespace` yields another handle to the same mapping, so every
/// holder observes every other holder's writes. Code sections that share a
/// scope hold clones of one namespace; the interpreter writes into it in
/// place.
#[derive(Clone, Default)]
pub struct Namespace(Rc<RefCell<HashMap<String, RuntimeValue>>>);

impl Namespace {
    pub fn new() -> Self {
        Namespace::default()
    }

    pub fn get(&self, name: &str) -> Option<RuntimeValue> {
        self.0.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: RuntimeValue) {
        self.0.borrow_mut().insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    /// Bound names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// True if both handles refer to the same mapping.
    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Namespace").field(&self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_bindings() {
        let a = Namespace::new();
        let b = a.clone();
        a.set("value", RuntimeValue::Int(1));
        assert_eq!(b.get("value"), Some(RuntimeValue::Int(1)));
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn fresh_namespaces_are_isolated() {
        let a = Namespace::new();
        let b = Namespace::new();
        a.set("value", RuntimeValue::Int(1));
        assert!(!b.contains("value"));
        assert!(!a.ptr_eq(&b));
    }
}
