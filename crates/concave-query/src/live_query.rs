use std::sync::Arc;

use concave_offline::OfflineManager;
use concave_reconciler::{ConnectionStatus, Reconciler, ReconcilerConfig, ReconcilerEvent};
use concave_store::{MutationKind, StoreError};
use concave_transport::{Page, SseFrame, Transport, TransportError, TransportRequest};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::lookups::OfflineLookups;

#[derive(Debug, Clone)]
pub struct LiveQuerySnapshot {
    pub items: Vec<Value>,
    pub status: ConnectionStatus,
    pub last_seq: u64,
    pub pending_count: usize,
    pub error: Option<String>,
}

type Listener = dyn Fn(LiveQuerySnapshot) + Send + Sync;

struct Inner {
    resource: String,
    transport: Arc<Transport>,
    offline: Option<OfflineManager>,
    reconciler: Arc<Reconciler>,
    optimistic: bool,
    listeners: RwLock<Vec<Arc<Listener>>>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    notify_task: Mutex<Option<JoinHandle<()>>>,
}

/// Composes the Transport, Offline Manager, and Reconciler into a single
/// reactive resource view.
#[derive(Clone)]
pub struct LiveQuery(Arc<Inner>);

impl LiveQuery {
    pub fn new(transport: Arc<Transport>, offline: Option<OfflineManager>, resource: impl Into<String>) -> Self {
        let optimistic = offline.is_some();
        let reconciler = match &offline {
            Some(offline) => {
                let lookups = Arc::new(OfflineLookups(offline.clone()));
                Arc::new(Reconciler::with_lookups(ReconcilerConfig::default(), lookups.clone(), lookups))
            }
            None => Arc::new(Reconciler::new(ReconcilerConfig::default())),
        };

        Self(Arc::new(Inner {
            resource: resource.into(),
            transport,
            offline,
            reconciler,
            optimistic,
            listeners: RwLock::new(Vec::new()),
            stream_task: Mutex::new(None),
            notify_task: Mutex::new(None),
        }))
    }

    pub fn with_optimistic(self, optimistic: bool) -> Self {
        // `Inner` isn't `Clone`-patchable in place since it's shared behind
        // an `Arc`; callers configure optimism before `start()` is called,
        // so rebuild a fresh inner with the override applied.
        let inner = &self.0;
        Self(Arc::new(Inner {
            resource: inner.resource.clone(),
            transport: inner.transport.clone(),
            offline: inner.offline.clone(),
            reconciler: inner.reconciler.clone(),
            optimistic,
            listeners: RwLock::new(Vec::new()),
            stream_task: Mutex::new(None),
            notify_task: Mutex::new(None),
        }))
    }

    pub fn mutate(&self) -> Mutate {
        Mutate(self.0.clone())
    }

    pub fn subscribe(&self, listener: impl Fn(LiveQuerySnapshot) + Send + Sync + 'static) {
        let inner = self.0.clone();
        tokio::spawn(async move {
            inner.listeners.write().await.push(Arc::new(listener));
        });
    }

    pub async fn get_snapshot(&self) -> LiveQuerySnapshot {
        self.0.snapshot().await
    }

    /// Fetches the bootstrap page and opens the subscription stream.
    pub async fn start(&self) -> Result<(), TransportError> {
        let page: Page<Value> = self
            .0
            .transport
            .request(TransportRequest::list(&self.0.resource))
            .await?
            .data;
        self.0.reconciler.bootstrap(page.items, 0).await;

        let inner = self.0.clone();
        let task = tokio::spawn(async move {
            inner.run_stream_loop().await;
        });
        *self.0.stream_task.lock().await = Some(task);

        let inner = self.0.clone();
        let mut events = self.0.reconciler.subscribe();
        let notify_task = tokio::spawn(async move {
            while events.recv().await.is_ok() {
                inner.notify_listeners().await;
            }
        });
        *self.0.notify_task.lock().await = Some(notify_task);

        Ok(())
    }

    pub async fn destroy(&self) {
        if let Some(task) = self.0.stream_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.0.notify_task.lock().await.take() {
            task.abort();
        }
        self.0.reconciler.destroy().await;
    }
}

impl Inner {
    async fn snapshot(&self) -> LiveQuerySnapshot {
        let snapshot = self.reconciler.snapshot().await;
        let pending_count = match &self.offline {
            Some(offline) => offline
                .get_pending_mutations()
                .await
                .map(|list| list.iter().filter(|m| m.resource == self.resource).count())
                .unwrap_or(0),
            None => 0,
        };
        LiveQuerySnapshot {
            items: snapshot.items,
            status: snapshot.status,
            last_seq: snapshot.last_seq,
            pending_count,
            error: snapshot.error,
        }
    }

    async fn notify_listeners(&self) {
        let snapshot = self.snapshot().await;
        for listener in self.listeners.read().await.iter() {
            listener(snapshot.clone());
        }
    }

    async fn run_stream_loop(&self) {
        loop {
            let resume_from = self.reconciler.resume_from().to_string();
            let params = vec![("resumeFrom".to_string(), resume_from)];

            let stream = match self.transport.open_event_stream(&format!("{}/subscribe", self.resource), params).await
            {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to open subscription stream");
                    match self.reconciler.on_disconnected().await {
                        Some(delay) => {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        None => return,
                    }
                }
            };

            futures_util::pin_mut!(stream);
            use futures_util::StreamExt;

            loop {
                match stream.next().await {
                    Some(frame) => self.reconciler.handle_frame(frame).await,
                    None => break,
                }
            }

            match self.reconciler.on_disconnected().await {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            }
        }
    }
}

/// `mutate.create/update/delete`, optimistic by default when an Offline
/// Manager is attached.
pub struct Mutate(Arc<Inner>);

impl Mutate {
    pub async fn create(&self, mut data: Value) -> Result<String, StoreError> {
        let optimistic_id = format!("opt_{}", uuid::Uuid::new_v4().simple());

        if let Value::Object(map) = &mut data {
            map.entry("id").or_insert_with(|| Value::String(optimistic_id.clone()));
        }

        if self.0.optimistic {
            self.0.reconciler.insert_local(optimistic_id.clone(), data.clone()).await;
        }

        if let Some(offline) = &self.0.offline {
            offline
                .queue_mutation(MutationKind::Create, &self.0.resource, Some(data), None, Some(optimistic_id.clone()))
                .await?;
        }

        self.0.notify_listeners().await;
        Ok(optimistic_id)
    }

    pub async fn update(&self, id: &str, patch: Value) -> Result<(), StoreError> {
        if self.0.optimistic {
            self.0.reconciler.patch_local(id, &patch).await;
        }

        if let Some(offline) = &self.0.offline {
            offline
                .queue_mutation(MutationKind::Update, &self.0.resource, Some(patch), Some(id.to_string()), None)
                .await?;
        }

        self.0.notify_listeners().await;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.0.optimistic {
            self.0.reconciler.remove_local(id).await;
        }

        if let Some(offline) = &self.0.offline {
            offline
                .queue_mutation(MutationKind::Delete, &self.0.resource, None, Some(id.to_string()), None)
                .await?;
        }

        self.0.notify_listeners().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concave_offline::{OfflineManager, OfflineManagerConfig};
    use concave_store::VolatileStore;
    use concave_transport::TransportConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn create_inserts_optimistic_item_synchronously() {
        let transport = Arc::new(Transport::new(TransportConfig::new("http://example.invalid")));
        let offline = OfflineManager::new(Arc::new(VolatileStore::new()), OfflineManagerConfig::default());
        offline.set_online(false).await;

        let query = LiveQuery::new(transport, Some(offline), "/todos");
        let id = query.mutate().create(serde_json::json!({"title": "A"})).await.unwrap();

        let snapshot = query.get_snapshot().await;
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0]["id"], id);
        assert_eq!(snapshot.pending_count, 1);
    }

    #[tokio::test]
    async fn bootstrap_fetches_initial_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"id": "a"}, {"id": "b"}],
                "nextCursor": null,
                "hasMore": false,
            })))
            .mount(&server)
            .await;

        let transport = Arc::new(Transport::new(TransportConfig::new(server.uri())));
        let query = LiveQuery::new(transport, None, "/todos");

        // Avoid actually holding open the subscription stream in this unit
        // test: drive the bootstrap step directly rather than via start().
        let page: Page<Value> =
            query.0.transport.request(TransportRequest::list("/todos")).await.unwrap().data;
        query.0.reconciler.bootstrap(page.items, 0).await;

        let snapshot = query.get_snapshot().await;
        assert_eq!(snapshot.items.len(), 2);
    }
}
