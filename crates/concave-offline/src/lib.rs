//! Queues, deduplicates/merges, syncs, remaps ids, and resolves conflicts
//! for writes made while offline. The core of the core.

pub mod conflict;
pub mod handler;
pub mod id_map;
pub mod manager;
pub mod value;

pub use conflict::{ConflictCallback, ConflictPolicy, ConflictResolution};
pub use handler::{SyncFailure, SyncHandler, SyncOutcome};
pub use id_map::IdMap;
pub use manager::{OfflineManager, OfflineManagerConfig};
pub use value::deep_remap;
