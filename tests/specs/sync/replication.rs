//! Replication specs
//!
//! Two reactors linked by an in-process transport. Envelopes from one
//! reactor's outbox land in the peer's inbox and replay as load jobs;
//! applied operations never echo back to the remote they came from.

use crate::prelude::*;
use async_trait::async_trait;
use keel_adapters::{ChannelTransport, TransportError};
use keel_core::SyncEnvelope;
use keel_storage::{RemoteRecord, ViewFilter};
use keel_sync::SyncManager;
use std::collections::HashMap;

/// Routes an outbound remote name to a peer manager's inbound remote
struct LinkedTransport {
    routes: Mutex<HashMap<String, (Arc<SyncManager>, String)>>,
}

impl LinkedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
        })
    }

    fn link(&self, outbound: &str, peer: Arc<SyncManager>, inbound: &str) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(outbound.to_string(), (peer, inbound.to_string()));
    }
}

#[async_trait]
impl ChannelTransport for LinkedTransport {
    async fn send(
        &self,
        remote_name: &str,
        envelope: &SyncEnvelope,
    ) -> Result<(), TransportError> {
        let route = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(remote_name)
            .cloned();
        let (peer, inbound) = route
            .ok_or_else(|| TransportError::Unreachable(remote_name.to_string()))?;
        peer.receive(&inbound, envelope.clone(), &CancellationToken::new())
            .await
            .map_err(|err| TransportError::Rejected(err.to_string()))
    }
}

fn record(name: &str, collection_id: &str) -> RemoteRecord {
    RemoteRecord {
        name: name.to_string(),
        collection_id: collection_id.to_string(),
        filter: ViewFilter::default(),
        channel_config: json!({}),
    }
}

#[tokio::test]
async fn documents_replicate_to_a_linked_peer() {
    let transport = LinkedTransport::new();
    let a = Harness::start_with(|builder| builder.with_transport(transport.clone())).await;
    let b = Harness::start_with(|builder| builder.with_transport(transport.clone())).await;

    let manager_a = a.reactor.sync_manager().unwrap();
    let manager_b = b.reactor.sync_manager().unwrap();
    manager_a
        .add_remote(record("to-b", "team"), &a.cancel)
        .await
        .unwrap();
    manager_b
        .add_remote(record("from-a", "team"), &b.cancel)
        .await
        .unwrap();
    transport.link("to-b", manager_b.clone(), "from-a");

    let (document_id, job_id) = a
        .reactor
        .create(
            NewDocument {
                document_id: None,
                document_type: "note".to_string(),
                slug: None,
                version: None,
            },
            Some("team".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(
        a.reactor.wait_for_job(&job_id).await.status,
        JobStatus::Completed
    );
    let mutate = a
        .reactor
        .mutate(
            &document_id,
            "body",
            Document::MAIN_BRANCH,
            vec![append("replicated")],
        )
        .await
        .unwrap();
    a.reactor.wait_for_job(&mutate).await;

    let channel_a = manager_a.channel("to-b").unwrap();
    channel_a.flush(&a.cancel).await.unwrap();

    let view_b = Arc::clone(b.reactor.view());
    let id = document_id.clone();
    wait_until(move || view_b.exists(&[id.clone()]).get(&id).copied().unwrap_or(false)).await;

    let doc = b
        .reactor
        .get(&document_id, Some("body"), None, &b.cancel)
        .await
        .unwrap();
    assert_eq!(doc.scope_state("body").unwrap()["text"], json!("replicated"));

    // Applied operations carry their source remote and never echo back.
    let channel_b = manager_b.channel("from-a").unwrap();
    assert!(channel_b.outbox().is_empty());

    a.reactor.kill().await;
    b.reactor.kill().await;
}

#[tokio::test]
async fn undeliverable_envelopes_dead_letter_after_retries() {
    let transport = LinkedTransport::new();
    let a = Harness::start_with(|builder| builder.with_transport(transport.clone())).await;
    let manager = a.reactor.sync_manager().unwrap();
    manager
        .add_remote(record("nowhere", "team"), &a.cancel)
        .await
        .unwrap();

    let (_, job_id) = a
        .reactor
        .create(
            NewDocument {
                document_id: None,
                document_type: "note".to_string(),
                slug: None,
                version: None,
            },
            Some("team".to_string()),
        )
        .await
        .unwrap();
    a.reactor.wait_for_job(&job_id).await;

    let channel = manager.channel("nowhere").unwrap();
    let mut dead = false;
    for _ in 0..20 {
        channel.flush(&a.cancel).await.unwrap();
        if !channel.dead_letter().is_empty() {
            dead = true;
            break;
        }
    }
    assert!(dead, "delivery failures never dead-lettered");
    assert!(channel.outbox().is_empty());
    a.reactor.kill().await;
}

#[tokio::test]
async fn inbound_operations_the_model_rejects_dead_letter() {
    let transport = LinkedTransport::new();
    let b = Harness::start_with(|builder| builder.with_transport(transport.clone())).await;
    let manager = b.reactor.sync_manager().unwrap();
    manager
        .add_remote(record("from-a", "team"), &b.cancel)
        .await
        .unwrap();

    // A bare custom action with no create underneath it cannot replay.
    let envelope = SyncEnvelope::operations(vec![append_op("doc-orphan", "x", 3, 0)]);
    manager.receive("from-a", envelope, &b.cancel).await.unwrap();

    let channel = manager.channel("from-a").unwrap();
    let dead_letter = Arc::clone(channel.dead_letter());
    wait_until(move || !dead_letter.is_empty()).await;
    assert!(channel.inbox().is_empty());
    b.reactor.kill().await;
}
