//! The `Mutation` record and the patch type used to update it in place.

use serde::{Deserialize, Serialize};

/// Kind of write a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// Lifecycle state of a queued mutation.
///
/// A mutation is in `Processing` for at most one syncer at a time; `Synced`
/// mutations are removed from the store rather than retained in this state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationStatus {
    Pending,
    Processing,
    Failed,
    Synced,
}

/// A durable record of a pending write, queued while offline or in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Locally unique identifier for this queue entry.
    pub id: String,
    /// Derived from type + resource + object-id + timestamp + randomness.
    /// Upstream handlers must treat this as the deduplication token.
    pub idempotency_key: String,
    pub kind: MutationKind,
    pub resource: String,
    /// Opaque structured payload; absent for deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Server-or-optimistic id the mutation targets.
    pub object_id: String,
    /// Present only for creates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimistic_id: Option<String>,
    /// Set once the server has assigned a permanent id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Milliseconds since the epoch; drives enqueue ordering.
    pub timestamp: i64,
    pub retry_count: u32,
    pub status: MutationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Mutation {
    pub fn is_retryable(&self, max_retries: u32) -> bool {
        matches!(self.status, MutationStatus::Pending | MutationStatus::Failed)
            && self.retry_count < max_retries
    }
}

/// A partial update applied to a stored mutation. `None` fields are left
/// untouched; this mirrors a closure-based `update`, but stays
/// serializable so the persisted store can apply it without round-tripping
/// through a trait object.
#[derive(Debug, Clone, Default)]
pub struct MutationPatch {
    pub kind: Option<MutationKind>,
    pub payload: Option<serde_json::Value>,
    pub object_id: Option<String>,
    pub server_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub timestamp: Option<i64>,
    pub retry_count: Option<u32>,
    pub status: Option<MutationStatus>,
    pub last_error: Option<String>,
}

impl MutationPatch {
    pub fn apply(self, mutation: &mut Mutation) {
        if let Some(kind) = self.kind {
            mutation.kind = kind;
        }
        if let Some(payload) = self.payload {
            mutation.payload = Some(payload);
        }
        if let Some(object_id) = self.object_id {
            mutation.object_id = object_id;
        }
        if let Some(server_id) = self.server_id {
            mutation.server_id = Some(server_id);
        }
        if let Some(idempotency_key) = self.idempotency_key {
            mutation.idempotency_key = idempotency_key;
        }
        if let Some(timestamp) = self.timestamp {
            mutation.timestamp = timestamp;
        }
        if let Some(retry_count) = self.retry_count {
            mutation.retry_count = retry_count;
        }
        if let Some(status) = self.status {
            mutation.status = status;
        }
        if let Some(last_error) = self.last_error {
            mutation.last_error = Some(last_error);
        }
    }

    pub fn status(mut self, status: MutationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = Some(n);
        self
    }

    pub fn last_error(mut self, err: impl Into<String>) -> Self {
        self.last_error = Some(err.into());
        self
    }

    pub fn server_id(mut self, id: impl Into<String>) -> Self {
        self.server_id = Some(id.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = Some(ts);
        self
    }
}
