//! Process-only `MutationStore` backed by an in-memory `Vec`.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::mutation::Mutation;
use crate::traits::{MutationStore, Result};

#[derive(Default)]
pub struct VolatileStore {
    mutations: RwLock<Vec<Mutation>>,
}

impl VolatileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MutationStore for VolatileStore {
    async fn list(&self) -> Result<Vec<Mutation>> {
        Ok(self.mutations.read().await.clone())
    }

    async fn add(&self, mutation: Mutation) -> Result<()> {
        self.mutations.write().await.push(mutation);
        Ok(())
    }

    async fn update(&self, id: &str, patch: crate::mutation::MutationPatch) -> Result<()> {
        let mut mutations = self.mutations.write().await;
        if let Some(entry) = mutations.iter_mut().find(|m| m.id == id) {
            patch.apply(entry);
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.mutations.write().await.retain(|m| m.id != id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.mutations.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{MutationKind, MutationPatch, MutationStatus};

    fn sample(id: &str) -> Mutation {
        Mutation {
            id: id.to_string(),
            idempotency_key: format!("idem-{id}"),
            kind: MutationKind::Create,
            resource: "/todos".to_string(),
            payload: None,
            object_id: id.to_string(),
            optimistic_id: None,
            server_id: None,
            timestamp: 0,
            retry_count: 0,
            status: MutationStatus::Pending,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn list_returns_a_copy_not_the_internal_buffer() {
        let store = VolatileStore::new();
        store.add(sample("m1")).await.unwrap();

        let mut snapshot = store.list().await.unwrap();
        snapshot.push(sample("m2"));

        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_on_missing_id_is_a_noop() {
        let store = VolatileStore::new();
        store.add(sample("m1")).await.unwrap();

        store
            .update("does-not-exist", MutationPatch::default().status(MutationStatus::Synced))
            .await
            .unwrap();

        assert_eq!(store.list().await.unwrap()[0].status, MutationStatus::Pending);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let store = VolatileStore::new();
        store.add(sample("m1")).await.unwrap();
        store.add(sample("m2")).await.unwrap();

        store.remove("m1").await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
