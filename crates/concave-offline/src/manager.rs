use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use concave_store::{Mutation, MutationKind, MutationPatch, MutationStatus, MutationStore, StoreError};
use rand::Rng;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::conflict::{resolve_conflict, ConflictCallback, ConflictPolicy, ConflictResolution};
use crate::handler::{SyncFailure, SyncHandler};
use crate::id_map::IdMap;
use crate::value::deep_remap;

#[derive(Debug, Clone)]
pub struct OfflineManagerConfig {
    pub dedupe_window: Duration,
    pub max_retries: u32,
    pub conflict_policy: ConflictPolicy,
}

impl Default for OfflineManagerConfig {
    fn default() -> Self {
        Self {
            dedupe_window: Duration::from_secs(5),
            max_retries: 5,
            conflict_policy: ConflictPolicy::ServerWins,
        }
    }
}

impl OfflineManagerConfig {
    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

type MutationCallback = dyn Fn(&Mutation) + Send + Sync;
type SyncCompleteCallback = dyn Fn() + Send + Sync;
type IdRemappedCallback = dyn Fn(&str, &str) + Send + Sync;

/// The core of the core: queues mutations, deduplicates/merges them at
/// enqueue time, syncs them in timestamp order with at-most-one concurrent
/// run, remaps optimistic ids to server ids, and dispatches conflicts to a
/// pluggable policy.
pub struct OfflineManager {
    store: Arc<dyn MutationStore>,
    id_map: Arc<IdMap>,
    config: OfflineManagerConfig,
    handler: Arc<RwLock<Option<Arc<dyn SyncHandler>>>>,
    conflict_callback: Arc<RwLock<Option<Arc<ConflictCallback>>>>,
    online: Arc<AtomicBool>,
    syncing: Arc<AtomicBool>,
    on_mutation_failed: Arc<RwLock<Vec<Arc<MutationCallback>>>>,
    on_sync_complete: Arc<RwLock<Vec<Arc<SyncCompleteCallback>>>>,
    on_id_remapped: Arc<RwLock<Vec<Arc<IdRemappedCallback>>>>,
}

impl Clone for OfflineManager {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            id_map: self.id_map.clone(),
            config: self.config.clone(),
            handler: self.handler.clone(),
            conflict_callback: self.conflict_callback.clone(),
            online: self.online.clone(),
            syncing: self.syncing.clone(),
            on_mutation_failed: self.on_mutation_failed.clone(),
            on_sync_complete: self.on_sync_complete.clone(),
            on_id_remapped: self.on_id_remapped.clone(),
        }
    }
}

impl OfflineManager {
    pub fn new(store: Arc<dyn MutationStore>, config: OfflineManagerConfig) -> Self {
        Self {
            store,
            id_map: Arc::new(IdMap::new()),
            config,
            handler: Arc::new(RwLock::new(None)),
            conflict_callback: Arc::new(RwLock::new(None)),
            online: Arc::new(AtomicBool::new(true)),
            syncing: Arc::new(AtomicBool::new(false)),
            on_mutation_failed: Arc::new(RwLock::new(Vec::new())),
            on_sync_complete: Arc::new(RwLock::new(Vec::new())),
            on_id_remapped: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn set_sync_handler(&self, handler: Arc<dyn SyncHandler>) {
        *self.handler.write().await = Some(handler);
    }

    pub async fn set_conflict_callback(
        &self,
        callback: impl Fn(&Mutation, &Value) -> ConflictResolution + Send + Sync + 'static,
    ) {
        *self.conflict_callback.write().await = Some(Arc::new(callback));
    }

    pub async fn on_mutation_failed(&self, callback: impl Fn(&Mutation) + Send + Sync + 'static) {
        self.on_mutation_failed.write().await.push(Arc::new(callback));
    }

    pub async fn on_sync_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_sync_complete.write().await.push(Arc::new(callback));
    }

    pub async fn on_id_remapped(&self, callback: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.on_id_remapped.write().await.push(Arc::new(callback));
    }

    /// Observes the host's one-bit connectivity signal; triggers
    /// `sync_pending` on the offline-to-online transition. Never runs its
    /// own heartbeat.
    pub async fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.sync_pending().await;
            });
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub async fn resolve_id(&self, id: &str) -> String {
        self.id_map.resolve(id).await
    }

    pub async fn register_id_mapping(&self, optimistic_id: &str, server_id: &str) {
        if self.id_map.register(optimistic_id, server_id).await {
            for cb in self.on_id_remapped.read().await.iter() {
                cb(optimistic_id, server_id);
            }
        }
    }

    pub async fn has_pending_for(&self, object_id: &str) -> bool {
        match self.store.list().await {
            Ok(list) => list.iter().any(|m| {
                matches!(
                    m.status,
                    MutationStatus::Pending | MutationStatus::Processing | MutationStatus::Failed
                ) && (m.object_id == object_id || m.optimistic_id.as_deref() == Some(object_id))
            }),
            Err(_) => false,
        }
    }

    pub async fn get_pending_mutations(&self) -> Result<Vec<Mutation>, StoreError> {
        self.store.list().await
    }

    pub async fn get_id_mappings(&self) -> HashMap<String, String> {
        self.id_map.snapshot().await
    }

    pub async fn clear_mutations(&self) -> Result<(), StoreError> {
        self.store.clear().await?;
        self.id_map.clear().await;
        Ok(())
    }

    /// Enqueue algorithm: dedupe against the pending queue before appending.
    pub async fn queue_mutation(
        &self,
        kind: MutationKind,
        resource: &str,
        payload: Option<Value>,
        object_id: Option<String>,
        optimistic_id: Option<String>,
    ) -> Result<String, StoreError> {
        let now = now_millis();

        let (object_id, optimistic_id) = match kind {
            MutationKind::Create => {
                let opt_id = optimistic_id.unwrap_or_else(|| new_id("opt"));
                (opt_id.clone(), Some(opt_id))
            }
            MutationKind::Update | MutationKind::Delete => {
                (object_id.expect("object_id is required for update/delete mutations"), None)
            }
        };

        let idempotency_key = new_idempotency_key(kind, resource, &object_id, now);
        let pending = self.store.list().await?;
        let dedupe_window_ms = self.config.dedupe_window.as_millis() as i64;

        for existing in pending.iter() {
            if !matches!(existing.status, MutationStatus::Pending | MutationStatus::Failed) {
                continue;
            }
            if existing.idempotency_key == idempotency_key {
                return Ok(existing.id.clone());
            }
            if existing.resource != resource {
                continue;
            }
            let within_window = (now - existing.timestamp).abs() <= dedupe_window_ms;
            if !within_window {
                continue;
            }

            match kind {
                MutationKind::Create => {
                    if existing.kind == MutationKind::Create
                        && existing.optimistic_id.as_deref() == Some(object_id.as_str())
                    {
                        return Ok(existing.id.clone());
                    }
                }
                MutationKind::Update => {
                    if existing.kind == MutationKind::Update && existing.object_id == object_id {
                        let merged = merge_payloads(existing.payload.clone(), payload.clone());
                        self.store
                            .update(
                                &existing.id,
                                MutationPatch::default()
                                    .payload(merged.unwrap_or(Value::Null))
                                    .timestamp(now),
                            )
                            .await?;
                        return Ok(existing.id.clone());
                    }
                }
                MutationKind::Delete => {
                    if existing.kind == MutationKind::Delete && existing.object_id == object_id {
                        return Ok(existing.id.clone());
                    }
                }
            }
        }

        let mutation_id = new_id("mut");
        let mutation = Mutation {
            id: mutation_id.clone(),
            idempotency_key,
            kind,
            resource: resource.to_string(),
            payload,
            object_id,
            optimistic_id,
            server_id: None,
            timestamp: now,
            retry_count: 0,
            status: MutationStatus::Pending,
            last_error: None,
        };
        self.store.add(mutation).await?;

        if self.is_online() {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.sync_pending().await;
            });
        }

        Ok(mutation_id)
    }

    /// At-most-one concurrent run, gated by `syncing`. A caller that loses
    /// the race returns immediately; its mutations are picked up by the
    /// already-running loop's next invocation (fired on completion or the
    /// next online transition), never by this call.
    pub async fn sync_pending(&self) {
        if !self.is_online() {
            return;
        }
        let handler = match self.handler.read().await.as_ref() {
            Some(h) => h.clone(),
            None => return,
        };
        if self.syncing.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }

        if let Err(err) = self.run_sync_cycle(handler).await {
            tracing::warn!(error = %err, "sync cycle aborted by a store error");
        }

        self.syncing.store(false, Ordering::SeqCst);

        for cb in self.on_sync_complete.read().await.iter() {
            cb();
        }
    }

    async fn run_sync_cycle(&self, handler: Arc<dyn SyncHandler>) -> Result<(), StoreError> {
        let mut pending = self.store.list().await?;
        pending.retain(|m| matches!(m.status, MutationStatus::Pending | MutationStatus::Failed));
        pending.sort_by_key(|m| m.timestamp);

        for mutation in pending {
            if mutation.retry_count >= self.config.max_retries {
                continue;
            }

            self.store
                .update(&mutation.id, MutationPatch::default().status(MutationStatus::Processing))
                .await?;

            let id_map_snapshot = self.id_map.snapshot().await;
            let mut remapped = mutation.clone();
            remapped.object_id = self.id_map.resolve(&mutation.object_id).await;
            remapped.payload = mutation.payload.as_ref().map(|p| deep_remap(p, &id_map_snapshot));

            match handler.sync(&remapped).await {
                Ok(outcome) => {
                    if let Some(server_id) = outcome.server_id {
                        if let Some(opt_id) = &mutation.optimistic_id {
                            self.register_id_mapping(opt_id, &server_id).await;
                        }
                    }
                    self.store.remove(&mutation.id).await?;
                }
                Err(SyncFailure::Conflict { server_state }) => {
                    let callback = self.conflict_callback.read().await.clone();
                    let resolution = resolve_conflict(
                        self.config.conflict_policy,
                        callback.as_deref(),
                        &mutation,
                        &server_state,
                    );
                    self.apply_conflict_resolution(&mutation, resolution).await?;
                }
                Err(SyncFailure::Error(err)) => {
                    self.store
                        .update(
                            &mutation.id,
                            MutationPatch::default()
                                .status(MutationStatus::Failed)
                                .retry_count(mutation.retry_count + 1)
                                .last_error(err.to_string()),
                        )
                        .await?;
                    for cb in self.on_mutation_failed.read().await.iter() {
                        cb(&mutation);
                    }
                }
            }
        }

        Ok(())
    }

    async fn apply_conflict_resolution(
        &self,
        mutation: &Mutation,
        resolution: ConflictResolution,
    ) -> Result<(), StoreError> {
        match resolution {
            ConflictResolution::Discard => {
                self.store.remove(&mutation.id).await?;
            }
            ConflictResolution::Retry => {
                self.store
                    .update(
                        &mutation.id,
                        MutationPatch::default()
                            .status(MutationStatus::Pending)
                            .retry_count(mutation.retry_count + 1),
                    )
                    .await?;
            }
            ConflictResolution::Replace { data, retry_with } => {
                let kind = retry_with.unwrap_or(mutation.kind);
                let now = now_millis();
                let mut patch = MutationPatch::default()
                    .status(MutationStatus::Pending)
                    .retry_count(mutation.retry_count + 1)
                    .payload(data)
                    .timestamp(now);
                patch.idempotency_key = Some(new_idempotency_key(kind, &mutation.resource, &mutation.object_id, now));
                patch.kind = Some(kind);
                self.store.update(&mutation.id, patch).await?;
            }
        }
        Ok(())
    }
}

fn merge_payloads(existing: Option<Value>, incoming: Option<Value>) -> Option<Value> {
    match (existing, incoming) {
        (Some(Value::Object(mut a)), Some(Value::Object(b))) => {
            for (k, v) in b {
                a.insert(k, v);
            }
            Some(Value::Object(a))
        }
        (Some(a), None) => Some(a),
        (_, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

fn new_idempotency_key(kind: MutationKind, resource: &str, object_id: &str, timestamp: i64) -> String {
    let nonce: u32 = rand::thread_rng().gen();
    format!("{kind:?}:{resource}:{object_id}:{timestamp}:{nonce}")
}
