use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concave_transport::{SseFrame, SubscriptionEvent, TransportError};
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::event::ReconcilerEvent;
use crate::lookups::{HasPendingFor, NoopLookups, ResolveId};
use crate::state::{ConnectionStatus, NetworkState};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub max_reconnect_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub broadcast_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            broadcast_capacity: 64,
        }
    }
}

/// Ordered sequence of items keyed by id, plus connection status and the
/// derived pending count (filled in by the Live Query layer, which is the
/// only component that knows about the Offline Manager's queue).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub items: Vec<Value>,
    pub status: ConnectionStatus,
    pub last_seq: u64,
    pub pending_count: usize,
    pub error: Option<String>,
}

fn item_id(value: &Value) -> Option<String> {
    value.get("id").and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Consumes a single SSE stream plus an initial list-fetch. Maintains an
/// ordered map of items keyed by id, a monotonic `last_seq`, and a
/// connection status.
pub struct Reconciler {
    items: Arc<RwLock<IndexMap<String, Value>>>,
    status: Arc<RwLock<ConnectionStatus>>,
    last_seq: Arc<AtomicU64>,
    attempt: Arc<AtomicU32>,
    error: Arc<RwLock<Option<String>>>,
    resolve_id: Arc<dyn ResolveId>,
    has_pending_for: Arc<dyn HasPendingFor>,
    config: ReconcilerConfig,
    events: broadcast::Sender<ReconcilerEvent>,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self::with_lookups(config, Arc::new(NoopLookups), Arc::new(NoopLookups))
    }

    pub fn with_lookups(
        config: ReconcilerConfig,
        resolve_id: Arc<dyn ResolveId>,
        has_pending_for: Arc<dyn HasPendingFor>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.broadcast_capacity);
        Self {
            items: Arc::new(RwLock::new(IndexMap::new())),
            status: Arc::new(RwLock::new(ConnectionStatus::Loading)),
            last_seq: Arc::new(AtomicU64::new(0)),
            attempt: Arc::new(AtomicU32::new(0)),
            error: Arc::new(RwLock::new(None)),
            resolve_id,
            has_pending_for,
            config,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconcilerEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Snapshot {
        let items = self.items.read().await;
        Snapshot {
            items: items.values().cloned().collect(),
            status: self.status().await,
            last_seq: self.last_seq(),
            pending_count: 0,
            error: self.error.read().await.clone(),
        }
    }

    async fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().await = status;
        let _ = self.events.send(ReconcilerEvent::StatusChanged(status));
    }

    /// Applies the initial paginated snapshot fetch and enters `Ready`.
    pub async fn bootstrap(&self, items: Vec<Value>, seq: u64) {
        let mut map = IndexMap::new();
        for item in items {
            if let Some(id) = item_id(&item) {
                map.insert(id, item);
            }
        }
        *self.items.write().await = map;
        self.last_seq.fetch_max(seq, Ordering::SeqCst);
        self.attempt.store(0, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Ready).await;
    }

    /// A successful `connected(seq)` resets the reconnect attempt counter.
    pub async fn on_connected(&self, seq: u64) {
        self.attempt.store(0, Ordering::SeqCst);
        self.last_seq.fetch_max(seq, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Ready).await;
        let _ = self.events.send(ReconcilerEvent::Connected { seq });
    }

    /// On SSE error, schedules a reconnect with exponential backoff:
    /// `min(1s * 2^attempts, 30s)`, up to `max_reconnect_attempts`. Returns
    /// `None` once attempts are exhausted, at which point status becomes
    /// `Error` (terminal for this session).
    pub async fn on_disconnected(&self) -> Option<Duration> {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.config.max_reconnect_attempts {
            let message = "max reconnect attempts exceeded".to_string();
            *self.error.write().await = Some(message.clone());
            self.set_status(ConnectionStatus::Error).await;
            let _ = self.events.send(ReconcilerEvent::Error(message));
            return None;
        }
        self.set_status(ConnectionStatus::Reconnecting).await;
        let _ = self.events.send(ReconcilerEvent::Disconnected);

        let multiplier = 1u64 << attempt.min(20);
        let delay = self.config.initial_backoff.saturating_mul(multiplier as u32);
        Some(delay.min(self.config.max_backoff))
    }

    /// Host reports offline; reconnects are deferred until the online
    /// transition.
    pub async fn set_network_state(&self, state: NetworkState) {
        if state == NetworkState::Offline {
            self.set_status(ConnectionStatus::Offline).await;
        }
    }

    /// `resumeFrom` value to reuse on reconnect.
    pub fn resume_from(&self) -> u64 {
        self.last_seq()
    }

    /// Handles one frame off the transport's SSE stream. Malformed frames
    /// are logged and skipped; the connection continues.
    pub async fn handle_frame(&self, frame: Result<SseFrame, TransportError>) {
        match frame {
            Ok(SseFrame::Connected { seq }) => self.on_connected(seq).await,
            Ok(SseFrame::Message(event)) => self.apply_event(event).await,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed subscription event");
            }
        }
    }

    /// Applies one subscription event to the item map. Idempotent: applying
    /// the same event twice yields the same state.
    pub async fn apply_event(&self, event: SubscriptionEvent) {
        let seq = event.seq();

        match event {
            SubscriptionEvent::Existing { object, .. } => {
                if let Some(id) = item_id(&object) {
                    let merged = self.merge_with_local(&id, object).await;
                    self.items.write().await.insert(id.clone(), merged);
                    self.retire_matching_optimistic(&id).await;
                }
            }
            SubscriptionEvent::Added { object, meta, .. } => {
                if let Some(id) = item_id(&object) {
                    let mut items = self.items.write().await;
                    items.insert(id.clone(), object);
                    if let Some(meta) = meta {
                        if let Some(opt_id) = meta.optimistic_id {
                            if opt_id != id {
                                items.shift_remove(&opt_id);
                            }
                        }
                    }
                    drop(items);
                    self.retire_matching_optimistic(&id).await;
                }
            }
            SubscriptionEvent::Changed { object, previous_object_id, .. } => {
                if let Some(id) = item_id(&object) {
                    let merged = self.merge_with_local(&id, object).await;
                    let mut items = self.items.write().await;
                    if let Some(previous) = &previous_object_id {
                        if previous != &id {
                            items.shift_remove(previous);
                        }
                    }
                    items.insert(id, merged);
                }
            }
            SubscriptionEvent::Removed { object_id, .. } => {
                self.items.write().await.shift_remove(&object_id);
            }
            SubscriptionEvent::Invalidate { .. } => {
                self.items.write().await.clear();
                self.last_seq.store(0, Ordering::SeqCst);
                self.set_status(ConnectionStatus::Loading).await;
                return;
            }
        }

        self.last_seq.fetch_max(seq, Ordering::SeqCst);
    }

    /// Fallback reconciliation path: when an `added`/`existing` event
    /// arrives without optimistic-id metadata, check whether its id is
    /// the server-id for any optimistic entry still held in the map.
    async fn retire_matching_optimistic(&self, incoming_id: &str) {
        let candidate_keys: Vec<String> = {
            let items = self.items.read().await;
            items.keys().filter(|k| k.as_str() != incoming_id).cloned().collect()
        };

        for key in candidate_keys {
            if self.resolve_id.resolve_id(&key).await == incoming_id {
                self.items.write().await.shift_remove(&key);
                break;
            }
        }
    }

    /// When there is still a pending mutation for `id`, fuses server fields
    /// with the locally held optimistic value: fields present locally are
    /// treated as "touched by the pending mutation" and win; all other
    /// fields come from the server. See DESIGN.md for why this is the
    /// chosen precedence.
    async fn merge_with_local(&self, id: &str, incoming: Value) -> Value {
        if !self.has_pending_for.has_pending_for(id).await {
            return incoming;
        }

        let items = self.items.read().await;
        match (items.get(id), incoming) {
            (Some(Value::Object(local)), Value::Object(mut server)) => {
                for (k, v) in local.iter() {
                    server.insert(k.clone(), v.clone());
                }
                Value::Object(server)
            }
            (_, other) => other,
        }
    }

    /// Synchronous local mutation helpers used by the Live Query layer to
    /// apply optimistic creates/updates/deletes before the sync handler
    /// has run. These never touch `last_seq`.
    pub async fn insert_local(&self, id: String, value: Value) {
        self.items.write().await.insert(id, value);
    }

    pub async fn patch_local(&self, id: &str, patch: &Value) {
        let mut items = self.items.write().await;
        if let Some(Value::Object(current)) = items.get_mut(id) {
            if let Value::Object(patch) = patch {
                for (k, v) in patch.iter() {
                    current.insert(k.clone(), v.clone());
                }
            }
        }
    }

    pub async fn remove_local(&self, id: &str) {
        self.items.write().await.shift_remove(id);
    }

    pub async fn destroy(&self) {
        self.items.write().await.clear();
        self.set_status(ConnectionStatus::Offline).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concave_transport::EventMeta;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct FixedLookups {
        mapping: StdMutex<std::collections::HashMap<String, String>>,
        pending: StdMutex<std::collections::HashSet<String>>,
    }

    impl FixedLookups {
        fn new() -> Self {
            Self { mapping: StdMutex::new(Default::default()), pending: StdMutex::new(Default::default()) }
        }
    }

    #[async_trait::async_trait]
    impl ResolveId for FixedLookups {
        async fn resolve_id(&self, id: &str) -> String {
            self.mapping.lock().unwrap().get(id).cloned().unwrap_or_else(|| id.to_string())
        }
    }

    #[async_trait::async_trait]
    impl HasPendingFor for FixedLookups {
        async fn has_pending_for(&self, object_id: &str) -> bool {
            self.pending.lock().unwrap().contains(object_id)
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(ReconcilerConfig::default())
    }

    #[tokio::test]
    async fn i1_no_two_items_share_an_id() {
        let r = reconciler();
        r.apply_event(SubscriptionEvent::Existing { object: json!({"id": "a"}), seq: 1 }).await;
        r.apply_event(SubscriptionEvent::Existing { object: json!({"id": "a", "v": 2}), seq: 2 }).await;

        let snapshot = r.snapshot().await;
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0]["v"], 2);
    }

    #[tokio::test]
    async fn i5_applying_the_same_event_twice_is_idempotent() {
        let r = reconciler();
        let event = SubscriptionEvent::Added { object: json!({"id": "a"}), seq: 3, meta: None };
        r.apply_event(event.clone()).await;
        r.apply_event(event).await;

        assert_eq!(r.snapshot().await.items.len(), 1);
        assert_eq!(r.last_seq(), 3);
    }

    #[tokio::test]
    async fn last_seq_only_advances_strictly_forward() {
        let r = reconciler();
        r.apply_event(SubscriptionEvent::Existing { object: json!({"id": "a"}), seq: 5 }).await;
        r.apply_event(SubscriptionEvent::Existing { object: json!({"id": "b"}), seq: 2 }).await;
        assert_eq!(r.last_seq(), 5);
    }

    #[tokio::test]
    async fn added_with_optimistic_meta_retires_the_placeholder() {
        let r = reconciler();
        r.apply_event(SubscriptionEvent::Added { object: json!({"id": "opt_1", "title": "A"}), seq: 1, meta: None })
            .await;

        r.apply_event(SubscriptionEvent::Added {
            object: json!({"id": "srv_1", "title": "A"}),
            seq: 2,
            meta: Some(EventMeta { optimistic_id: Some("opt_1".to_string()) }),
        })
        .await;

        let snapshot = r.snapshot().await;
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0]["id"], "srv_1");
    }

    #[tokio::test]
    async fn fallback_retires_optimistic_entry_via_resolve_id_when_meta_missing() {
        let lookups = Arc::new(FixedLookups::new());
        lookups.mapping.lock().unwrap().insert("opt_1".to_string(), "srv_1".to_string());
        let r = Reconciler::with_lookups(ReconcilerConfig::default(), lookups.clone(), lookups);

        r.apply_event(SubscriptionEvent::Added { object: json!({"id": "opt_1"}), seq: 1, meta: None }).await;
        r.apply_event(SubscriptionEvent::Added { object: json!({"id": "srv_1"}), seq: 2, meta: None }).await;

        let snapshot = r.snapshot().await;
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0]["id"], "srv_1");
    }

    #[tokio::test]
    async fn changed_with_previous_object_id_removes_the_old_entry() {
        let r = reconciler();
        r.apply_event(SubscriptionEvent::Existing { object: json!({"id": "old"}), seq: 1 }).await;
        r.apply_event(SubscriptionEvent::Changed {
            object: json!({"id": "new"}),
            previous_object_id: Some("old".to_string()),
            seq: 2,
        })
        .await;

        let snapshot = r.snapshot().await;
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0]["id"], "new");
    }

    #[tokio::test]
    async fn pending_mutation_fields_win_over_conflicting_server_fields() {
        let lookups = Arc::new(FixedLookups::new());
        lookups.pending.lock().unwrap().insert("x".to_string());
        let r = Reconciler::with_lookups(ReconcilerConfig::default(), lookups.clone(), lookups);

        r.apply_event(SubscriptionEvent::Existing { object: json!({"id": "x", "title": "local edit"}), seq: 1 })
            .await;
        r.apply_event(SubscriptionEvent::Changed {
            object: json!({"id": "x", "title": "server value", "count": 9}),
            previous_object_id: None,
            seq: 2,
        })
        .await;

        let snapshot = r.snapshot().await;
        assert_eq!(snapshot.items[0]["title"], "local edit");
        assert_eq!(snapshot.items[0]["count"], 9);
    }

    #[tokio::test]
    async fn invalidate_clears_items_and_resets_seq() {
        let r = reconciler();
        r.apply_event(SubscriptionEvent::Existing { object: json!({"id": "a"}), seq: 5 }).await;
        r.apply_event(SubscriptionEvent::Invalidate { reason: None, seq: 6 }).await;

        let snapshot = r.snapshot().await;
        assert!(snapshot.items.is_empty());
        assert_eq!(r.last_seq(), 0);
        assert_eq!(snapshot.status, ConnectionStatus::Loading);
    }

    #[tokio::test]
    async fn s6_reconnect_backoff_caps_and_terminates_after_max_attempts() {
        let r = Reconciler::new(ReconcilerConfig {
            max_reconnect_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            broadcast_capacity: 8,
        });

        assert_eq!(r.on_disconnected().await, Some(Duration::from_secs(1)));
        assert_eq!(r.on_disconnected().await, Some(Duration::from_secs(2)));
        assert_eq!(r.on_disconnected().await, Some(Duration::from_secs(4)));
        assert_eq!(r.on_disconnected().await, None);
        assert_eq!(r.status().await, ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn connected_resets_reconnect_attempt_counter() {
        let r = reconciler();
        let _ = r.on_disconnected().await;
        let _ = r.on_disconnected().await;
        r.on_connected(1).await;

        let delay = r.on_disconnected().await;
        assert_eq!(delay, Some(Duration::from_secs(1)));
    }
}
