use async_trait::async_trait;
use thiserror::Error;

use crate::mutation::{Mutation, MutationPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A contract, not an implementation: the durable ordered queue of pending
/// mutations. `list()` returns a snapshot copy in insertion order and must
/// never expose the internal buffer; `update` on a missing id is a no-op.
#[async_trait]
pub trait MutationStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Mutation>>;
    async fn add(&self, mutation: Mutation) -> Result<()>;
    async fn update(&self, id: &str, patch: MutationPatch) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}
