//! Wires Transport, Mutation Store, Offline Manager, Reconciler, and Live
//! Query together the way an application actually would, rather than
//! exercising each crate in isolation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use concave_offline::{OfflineManager, OfflineManagerConfig, SyncFailure, SyncHandler, SyncOutcome};
use concave_query::LiveQuery;
use concave_store::{Mutation, MutationKind, VolatileStore};
use concave_transport::{Transport, TransportConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A handler that assigns the next sequential `srv_N` id and is effectively
/// instantaneous, so the id mapping is registered well before the delayed
/// SSE response below arrives.
struct SequentialHandler {
    counter: AtomicU32,
}

impl SequentialHandler {
    fn new() -> Self {
        Self { counter: AtomicU32::new(0) }
    }
}

#[async_trait]
impl SyncHandler for SequentialHandler {
    async fn sync(&self, mutation: &Mutation) -> Result<SyncOutcome, SyncFailure> {
        let server_id = match mutation.kind {
            MutationKind::Create => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                Some(format!("srv_{n}"))
            }
            _ => None,
        };
        Ok(SyncOutcome { server_id })
    }
}

fn sse_body(frames: &[(&str, serde_json::Value)]) -> String {
    let mut body = String::new();
    for (event, data) in frames {
        body.push_str(&format!("event: {event}\ndata: {data}\n\n"));
    }
    body
}

/// Create offline, come online, sync assigns a server id, and a
/// subscription `added` event for that server id (arriving with no
/// optimistic-id metadata, forcing the reconciler's `resolveId` fallback
/// path) retires the optimistic placeholder. The live query's snapshot
/// converges to exactly one item under the server id, with no mutation
/// left pending.
#[tokio::test]
async fn r1_offline_create_converges_to_one_item_under_the_server_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/todos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [],
            "nextCursor": null,
            "hasMore": false,
        })))
        .mount(&server)
        .await;

    let stream_body = sse_body(&[
        ("connected", serde_json::json!({"seq": 1})),
        ("message", serde_json::json!({"type": "added", "object": {"id": "srv_1", "title": "A"}, "seq": 2})),
    ]);
    Mock::given(method("GET"))
        .and(path("/todos/subscribe"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(stream_body, "text/event-stream")
                .set_delay(Duration::from_millis(150)),
        )
        .mount(&server)
        .await;

    let transport = Arc::new(Transport::new(TransportConfig::new(server.uri())));
    let offline = OfflineManager::new(Arc::new(VolatileStore::new()), OfflineManagerConfig::default());
    offline.set_online(false).await;
    offline.set_sync_handler(Arc::new(SequentialHandler::new())).await;

    let query = LiveQuery::new(transport, Some(offline.clone()), "/todos");
    query.start().await.unwrap();

    let optimistic_id = query.mutate().create(serde_json::json!({"title": "A"})).await.unwrap();
    assert!(optimistic_id.starts_with("opt_"));

    let snapshot = query.get_snapshot().await;
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.pending_count, 1);

    offline.set_online(true).await;

    let mut converged = false;
    for _ in 0..50 {
        let snapshot = query.get_snapshot().await;
        if snapshot.items.len() == 1 && snapshot.items[0]["id"] == "srv_1" {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(converged, "snapshot never converged to a single server-id item");

    assert!(offline.get_pending_mutations().await.unwrap().is_empty());
    assert_eq!(offline.resolve_id(&optimistic_id).await, "srv_1");

    query.destroy().await;
}

/// Create then update the same optimistic id offline; once synced, the
/// offline manager's id map resolves that optimistic id to the server id
/// the create was assigned, independent of any subscription stream.
#[tokio::test]
async fn r2_update_after_create_resolves_through_the_remapped_server_id() {
    let server = MockServer::start().await;
    let transport = Arc::new(Transport::new(TransportConfig::new(server.uri())));

    let offline = OfflineManager::new(Arc::new(VolatileStore::new()), OfflineManagerConfig::default());
    offline.set_online(false).await;
    offline.set_sync_handler(Arc::new(SequentialHandler::new())).await;

    let query = LiveQuery::new(transport, Some(offline.clone()), "/todos");
    let optimistic_id = query.mutate().create(serde_json::json!({"title": "A"})).await.unwrap();
    query.mutate().update(&optimistic_id, serde_json::json!({"completed": true})).await.unwrap();

    offline.set_online(true).await;
    offline.sync_pending().await;

    assert_eq!(offline.resolve_id(&optimistic_id).await, "srv_1");
    assert!(offline.get_pending_mutations().await.unwrap().is_empty());
}
