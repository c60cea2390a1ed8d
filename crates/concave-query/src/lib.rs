//! Composes the Transport, Offline Manager, and Subscription Reconciler
//! into a single reactive resource view: `get_snapshot()`, `subscribe()`,
//! and `mutate().create/update/delete()`.

pub mod live_query;
pub mod lookups;
pub mod query_key;

pub use live_query::{LiveQuery, LiveQuerySnapshot, Mutate};
pub use lookups::OfflineLookups;
pub use query_key::QueryKey;
