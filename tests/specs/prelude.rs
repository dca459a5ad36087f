//! Shared fixtures for reactor specs
//!
//! Specs exercise a full reactor over real tempdir storage. Each spec
//! builds its own reactor (or pair of reactors for replication) and
//! drives it through the public facade only.

pub use keel_core::{
    Action, CancellationToken, Document, DocumentModel, EventKind, JobStatus, ModelError,
    Operation, OperationContext, OperationWithContext, ReactorConfig, ReactorError, ReactorEvent,
};
pub use keel_engine::{NewDocument, Reactor, ReactorBuilder};
pub use serde_json::json;
pub use std::sync::{Arc, Mutex};
pub use std::time::Duration;

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;

/// Minimal document model: a note whose body accumulates appended text
pub struct NoteModel;

impl DocumentModel for NoteModel {
    fn document_type(&self) -> &str {
        "note"
    }

    fn initial_state(&self) -> serde_json::Value {
        json!({ "text": "" })
    }

    fn reduce(
        &self,
        state: serde_json::Value,
        action: &Action,
    ) -> Result<serde_json::Value, ModelError> {
        match action.kind.as_str() {
            "APPEND" => {
                let mut text = state["text"].as_str().unwrap_or("").to_string();
                text.push_str(action.input["text"].as_str().unwrap_or(""));
                Ok(json!({ "text": text }))
            }
            other => Err(ModelError::UnknownAction {
                kind: other.to_string(),
            }),
        }
    }
}

/// A reactor over its own tempdir; drop tears the storage down
pub struct Harness {
    dir: TempDir,
    pub reactor: Arc<Reactor>,
    pub cancel: CancellationToken,
}

impl Harness {
    pub async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let reactor = Self::builder_for(dir.path()).build().await.unwrap();
        Self {
            dir,
            reactor,
            cancel: CancellationToken::new(),
        }
    }

    pub async fn start_with(configure: impl FnOnce(ReactorBuilder) -> ReactorBuilder) -> Self {
        let dir = TempDir::new().unwrap();
        let reactor = configure(Self::builder_for(dir.path())).build().await.unwrap();
        Self {
            dir,
            reactor,
            cancel: CancellationToken::new(),
        }
    }

    fn builder_for(path: &std::path::Path) -> ReactorBuilder {
        let config = ReactorConfig {
            storage_dir: path.to_path_buf(),
            ..Default::default()
        };
        Reactor::builder(config).with_models(vec![Arc::new(NoteModel)])
    }

    /// Stop the reactor and reopen it over the same storage
    pub async fn restart(&mut self) {
        self.reactor.kill().await;
        self.reactor = Self::builder_for(self.dir.path()).build().await.unwrap();
    }

    /// Create a note and wait for the job to finish
    pub async fn create_note(&self, slug: Option<&str>) -> String {
        let (document_id, job_id) = self
            .reactor
            .create(
                NewDocument {
                    document_id: None,
                    document_type: "note".to_string(),
                    slug: slug.map(str::to_string),
                    version: None,
                },
                None,
            )
            .await
            .unwrap();
        let job = self.reactor.wait_for_job(&job_id).await;
        assert_eq!(job.status, JobStatus::Completed, "create failed: {job:?}");
        document_id
    }
}

static NEXT_ACTION: AtomicU64 = AtomicU64::new(0);

/// An APPEND action with a fresh id
pub fn append(text: &str) -> Action {
    let seq = NEXT_ACTION.fetch_add(1, Ordering::Relaxed);
    Action::new(
        format!("spec-act-{seq}"),
        "APPEND",
        "body",
        Utc::now().timestamp_millis(),
        json!({ "text": text }),
    )
}

/// An APPEND wrapped as a loadable operation at `(index, skip)`
pub fn append_op(document_id: &str, text: &str, index: u64, skip: u64) -> OperationWithContext {
    OperationWithContext {
        operation: Operation::from_action(append(text), index, skip),
        context: OperationContext {
            document_id: document_id.to_string(),
            document_type: "note".to_string(),
            scope: "body".to_string(),
            branch: Document::MAIN_BRANCH.to_string(),
            ordinal: 0,
            source_remote: String::new(),
        },
    }
}

/// Poll `cond` for up to two seconds
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
}
