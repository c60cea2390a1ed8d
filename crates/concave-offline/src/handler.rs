//! The application-supplied sync handler: the one seam between the Offline
//! Manager and whatever actually talks to the server for a given mutation.

use async_trait::async_trait;
use concave_store::Mutation;
use concave_transport::TransportError;

/// Outcome of successfully syncing one mutation.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// The server's id for the affected object, when it differs from the
    /// mutation's current `object_id` (always present for creates).
    pub server_id: Option<String>,
}

/// Failure categorisation the sync loop switches on. A conflict carries the
/// server's current state and is never auto-retried without going through
/// the conflict policy; anything else is a generic failure on the
/// failed/retry path.
#[derive(Debug, Clone)]
pub enum SyncFailure {
    Conflict { server_state: serde_json::Value },
    Error(TransportError),
}

impl From<TransportError> for SyncFailure {
    fn from(err: TransportError) -> Self {
        if err.is_conflict() {
            SyncFailure::Conflict {
                server_state: err.details().cloned().unwrap_or(serde_json::Value::Null),
            }
        } else {
            SyncFailure::Error(err)
        }
    }
}

/// Implemented by the application to actually perform the network call for
/// a remapped mutation.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn sync(&self, mutation: &Mutation) -> Result<SyncOutcome, SyncFailure>;
}

#[async_trait]
impl<F, Fut> SyncHandler for F
where
    F: Fn(Mutation) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<SyncOutcome, SyncFailure>> + Send,
{
    async fn sync(&self, mutation: &Mutation) -> Result<SyncOutcome, SyncFailure> {
        (self)(mutation.clone()).await
    }
}
