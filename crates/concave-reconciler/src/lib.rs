//! Consumes an initial list-fetch plus a resumable SSE stream and folds both
//! into a single ordered item map, with a connection state machine and
//! fusion rules for the Offline Manager's optimistic state.

pub mod event;
pub mod lookups;
pub mod reconciler;
pub mod state;

pub use event::ReconcilerEvent;
pub use lookups::{HasPendingFor, NoopLookups, ResolveId};
pub use reconciler::{Reconciler, ReconcilerConfig, Snapshot};
pub use state::{ConnectionStatus, NetworkState};
