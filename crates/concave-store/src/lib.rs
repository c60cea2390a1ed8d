//! Durable ordered queue of pending mutations: the `MutationStore` contract
//! plus a volatile (in-process) and a persisted (single JSON blob)
//! implementation.

pub mod mutation;
pub mod persisted;
pub mod traits;
pub mod volatile;

pub use mutation::{Mutation, MutationKind, MutationPatch, MutationStatus};
pub use persisted::{PersistedStore, PersistedStoreConfig};
pub use traits::{MutationStore, Result, StoreError};
pub use volatile::VolatileStore;
