//! Mapping from optimistic-id to server-id. Lives for the session and is
//! cleared with the queue. Never records identity mappings; once an
//! optimistic-id is mapped, further reads resolve to the server-id.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Default)]
pub struct IdMap {
    inner: RwLock<HashMap<String, String>>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `optimistic_id -> server_id`. A no-op when the two are equal;
    /// returns whether a new mapping was actually recorded (used to decide
    /// whether the id-remap callback fires).
    pub async fn register(&self, optimistic_id: &str, server_id: &str) -> bool {
        if optimistic_id == server_id {
            return false;
        }
        self.inner.write().await.insert(optimistic_id.to_string(), server_id.to_string());
        true
    }

    /// Returns the mapped server id if present, else the input unchanged.
    pub async fn resolve(&self, id: &str) -> String {
        self.inner.read().await.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().await.clone()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_returns_input_when_unmapped() {
        let map = IdMap::new();
        assert_eq!(map.resolve("opt_1").await, "opt_1");
    }

    #[tokio::test]
    async fn register_then_resolve_is_monotonic() {
        let map = IdMap::new();
        assert!(map.register("opt_1", "srv_1").await);
        assert_eq!(map.resolve("opt_1").await, "srv_1");
        assert_eq!(map.resolve("opt_1").await, "srv_1");
    }

    #[tokio::test]
    async fn identity_mapping_is_a_noop() {
        let map = IdMap::new();
        assert!(!map.register("same", "same").await);
        assert!(map.snapshot().await.is_empty());
    }
}
