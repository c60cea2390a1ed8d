use async_trait::async_trait;
use concave_offline::OfflineManager;
use concave_reconciler::{HasPendingFor, ResolveId};

/// Wires the Offline Manager's `resolveId`/`hasPendingFor` into the
/// reconciler as plain trait objects: injected as functions,
/// not via a shared object, so neither crate needs to know about the other.
pub struct OfflineLookups(pub OfflineManager);

#[async_trait]
impl ResolveId for OfflineLookups {
    async fn resolve_id(&self, id: &str) -> String {
        self.0.resolve_id(id).await
    }
}

#[async_trait]
impl HasPendingFor for OfflineLookups {
    async fn has_pending_for(&self, object_id: &str) -> bool {
        self.0.has_pending_for(object_id).await
    }
}
