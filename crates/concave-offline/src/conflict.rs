//! Conflict policy as a strategy, represented as a single tagged variant the
//! sync loop only switches on. The policy never gets baked into the loop.

use concave_store::{Mutation, MutationKind};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    ServerWins,
    ClientWins,
    Manual,
}

/// Resolution returned from `resolve_conflict`.
#[derive(Debug, Clone)]
pub enum ConflictResolution {
    Discard,
    Retry,
    Replace { data: Value, retry_with: Option<MutationKind> },
}

pub type ConflictCallback = dyn Fn(&Mutation, &Value) -> ConflictResolution + Send + Sync;

/// Applies the configured policy. A registered callback always wins over
/// the policy.
pub fn resolve_conflict(
    policy: ConflictPolicy,
    callback: Option<&ConflictCallback>,
    mutation: &Mutation,
    server_state: &Value,
) -> ConflictResolution {
    if let Some(callback) = callback {
        return callback(mutation, server_state);
    }

    match policy {
        ConflictPolicy::ServerWins => ConflictResolution::Discard,
        ConflictPolicy::ClientWins => ConflictResolution::Retry,
        ConflictPolicy::Manual => ConflictResolution::Discard,
    }
}
