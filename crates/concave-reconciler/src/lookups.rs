//! The two lookups the reconciler is parameterised by, injected as trait
//! objects rather than a shared Offline Manager instance. This keeps the
//! reconciler testable with pure stubs and the Offline Manager free of any
//! reconciler knowledge.

use async_trait::async_trait;

#[async_trait]
pub trait ResolveId: Send + Sync {
    async fn resolve_id(&self, id: &str) -> String;
}

#[async_trait]
pub trait HasPendingFor: Send + Sync {
    async fn has_pending_for(&self, object_id: &str) -> bool;
}

/// Stub that never remaps anything and reports nothing pending; useful for
/// reconciler-only tests and as a default when no Offline Manager is
/// attached.
pub struct NoopLookups;

#[async_trait]
impl ResolveId for NoopLookups {
    async fn resolve_id(&self, id: &str) -> String {
        id.to_string()
    }
}

#[async_trait]
impl HasPendingFor for NoopLookups {
    async fn has_pending_for(&self, _object_id: &str) -> bool {
        false
    }
}
