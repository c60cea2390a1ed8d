//! Naming scheme for a live query: a resource scope plus optional id and
//! filter params, with a stable cache key derived by hashing.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub scope: String,
    pub id: Option<String>,
    pub params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(scope: impl Into<String>) -> Self {
        Self { scope: scope.into(), id: None, params: BTreeMap::new() }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn to_cache_key(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("{}:{:x}", self.scope, hasher.finish())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope)?;
        if let Some(id) = &self.id {
            write!(f, "/{id}")?;
        }
        if !self.params.is_empty() {
            write!(f, "?")?;
            let parts: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, "{}", parts.join("&"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_equal_keys() {
        let a = QueryKey::new("todos").with_param("status", "open");
        let b = QueryKey::new("todos").with_param("status", "open");
        assert_eq!(a.to_cache_key(), b.to_cache_key());
    }

    #[test]
    fn cache_key_differs_with_params() {
        let a = QueryKey::new("todos").with_param("status", "open");
        let b = QueryKey::new("todos").with_param("status", "closed");
        assert_ne!(a.to_cache_key(), b.to_cache_key());
    }

    #[test]
    fn display_renders_scope_id_and_params() {
        let key = QueryKey::new("todos").with_id("42").with_param("status", "open");
        assert_eq!(key.to_string(), "todos/42?status=open");
    }
}
