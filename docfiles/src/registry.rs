use std::collections::HashMap;

use interpreter::Namespace;

/// Namespaces of one documentation file, keyed by scope.
///
/// A registry lives for a single file's collection pass. Blocks naming the
/// same scope share a namespace; blocks without one each get a fresh one.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: HashMap<String, Namespace>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        ScopeRegistry::default()
    }

    pub fn get_or_create(&mut self, scope: Option<&str>) -> Namespace {
        match scope {
            Some(key) => self
                .scopes
                .entry(key.to_string())
                .or_insert_with(|| {
                    log::debug!("new scope '{key}'");
                    Namespace::new()
                })
                .clone(),
            None => Namespace::new(),
        }
    }

    /// Number of named scopes created so far.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_a_namespace() {
        let mut registry = ScopeRegistry::new();
        let a = registry.get_or_create(Some("s"));
        let b = registry.get_or_create(Some("s"));
        assert!(a.ptr_eq(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_keys_are_isolated() {
        let mut registry = ScopeRegistry::new();
        let a = registry.get_or_create(Some("a"));
        let b = registry.get_or_create(Some("b"));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn absent_key_is_never_reused() {
        let mut registry = ScopeRegistry::new();
        let a = registry.get_or_create(None);
        let b = registry.get_or_create(None);
        assert!(!a.ptr_eq(&b));
        assert!(registry.is_empty());
    }
}
