//! Persisted `MutationStore`: a single JSON blob holding the whole queue.
//!
//! The `MutationStore` contract only requires a single key holding a JSON
//! array of self-contained entries; it does not forbid chunked storage.
//! This implementation writes the whole array on every
//! mutation, which is the simplest strategy that satisfies the contract and
//! is adequate for small queues. A future implementation of `MutationStore`
//! is free to shard by id without touching callers.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;

use crate::mutation::Mutation;
use crate::traits::{MutationStore, Result};

#[derive(Debug, Clone)]
pub struct PersistedStoreConfig {
    pub path: PathBuf,
    pub atomic_writes: bool,
}

impl PersistedStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), atomic_writes: true }
    }
}

pub struct PersistedStore {
    config: PersistedStoreConfig,
    cache: RwLock<Vec<Mutation>>,
}

impl PersistedStore {
    /// Create a new persisted store, eagerly loading whatever is on disk.
    /// A parse failure yields an empty list rather than propagating an
    /// error, per the external-interfaces contract.
    pub async fn open(config: PersistedStoreConfig) -> Self {
        let initial = Self::read_from_disk(&config.path).await;
        Self { config, cache: RwLock::new(initial) }
    }

    async fn read_from_disk(path: &PathBuf) -> Vec<Mutation> {
        match fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(mutations) => mutations,
                Err(err) => {
                    warn!(error = %err, "mutation store blob failed to parse, starting empty");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                warn!(error = %err, "mutation store blob unreadable, starting empty");
                Vec::new()
            }
        }
    }

    async fn write_to_disk(&self, mutations: &[Mutation]) -> Result<()> {
        let json = serde_json::to_string_pretty(mutations)?;

        if self.config.atomic_writes {
            let temp_path = self.config.path.with_extension("tmp");
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &self.config.path).await?;
        } else {
            fs::write(&self.config.path, json).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl MutationStore for PersistedStore {
    async fn list(&self) -> Result<Vec<Mutation>> {
        Ok(self.cache.read().await.clone())
    }

    async fn add(&self, mutation: Mutation) -> Result<()> {
        let mut mutations = self.cache.write().await;
        mutations.push(mutation);
        self.write_to_disk(&mutations).await
    }

    async fn update(&self, id: &str, patch: crate::mutation::MutationPatch) -> Result<()> {
        let mut mutations = self.cache.write().await;
        if let Some(entry) = mutations.iter_mut().find(|m| m.id == id) {
            patch.apply(entry);
            self.write_to_disk(&mutations).await?;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut mutations = self.cache.write().await;
        mutations.retain(|m| m.id != id);
        self.write_to_disk(&mutations).await
    }

    async fn clear(&self) -> Result<()> {
        let mut mutations = self.cache.write().await;
        mutations.clear();
        if self.config.path.exists() {
            fs::remove_file(&self.config.path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{MutationKind, MutationStatus};
    use tempfile::tempdir;

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
    async fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mutations.json");

        {
            let store = PersistedStore::open(PersistedStoreConfig::new(&path)).await;
            store.add(sample("m1")).await.unwrap();
        }

        let store = PersistedStore::open(PersistedStoreConfig::new(&path)).await;
        let mutations = store.list().await.unwrap();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].id, "m1");
    }

    #[tokio::test]
    async fn corrupt_blob_yields_empty_list_not_a_crash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mutations.json");
        fs::write(&path, "not json at all").await.unwrap();

        let store = PersistedStore::open(PersistedStoreConfig::new(&path)).await;
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn temp_file_is_cleaned_up_after_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mutations.json");
        let store = PersistedStore::open(PersistedStoreConfig::new(&path)).await;

        store.add(sample("m1")).await.unwrap();

        assert!(!path.with_extension("tmp").exists());
    }
}
