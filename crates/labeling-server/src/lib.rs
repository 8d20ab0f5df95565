//! Process-wide state and wiring for the HTTP/WebSocket API: the stores
//! and clients every handler shares, the registry tracking in-flight
//! detection runs so a second `start` on the same file is rejected and a
//! `cancel` can reach the right task, and the top-level `serve` entry
//! point `labeling-engine serve` calls into.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use labeling_core::{Config, ConversationStore, EventBus, FileStore, LabelStore};
use labeling_providers::ProviderRegistry;
use labeling_queue::QueueClient;

mod error;
mod http;
mod loader;
mod persistence;
mod runner;
mod ws;

pub use error::ApiError;
pub use http::app_router;

/// The producer half of the parse queue, abstracted so the HTTP layer can
/// be exercised with `tower::ServiceExt` against an in-memory stand-in
/// instead of a live Redis connection. `QueueClient` implements this
/// directly; nothing about the consumer side (`read_group`/`ack`, owned
/// by the worker binary) needs abstracting.
#[async_trait]
pub trait Enqueuer: Send + Sync {
    async fn enqueue(
        &self,
        stream: &str,
        file_id: &str,
        metadata: Option<&HashMap<String, Value>>,
    ) -> anyhow::Result<String>;

    async fn health_check(&self) -> anyhow::Result<bool>;
}

#[async_trait]
impl Enqueuer for QueueClient {
    async fn enqueue(
        &self,
        stream: &str,
        file_id: &str,
        metadata: Option<&HashMap<String, Value>>,
    ) -> anyhow::Result<String> {
        Ok(QueueClient::enqueue(self, stream, file_id, metadata).await?)
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        Ok(QueueClient::health_check(self).await?)
    }
}

/// Tracks which files currently have an active auto-detection run, so a
/// second `start` command is rejected rather than racing the first, and a
/// `cancel` command has a token to signal.
#[derive(Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new run for `file_id`, returning its cancellation token,
    /// or `None` if a run is already active.
    pub async fn try_start(&self, file_id: &str) -> Option<CancellationToken> {
        let mut guard = self.active.lock().await;
        if guard.contains_key(file_id) {
            return None;
        }
        let token = CancellationToken::new();
        guard.insert(file_id.to_string(), token.clone());
        Some(token)
    }

    /// Signals cancellation for `file_id`'s active run, if any. Returns
    /// whether a run was found to cancel.
    pub async fn cancel(&self, file_id: &str) -> bool {
        match self.active.lock().await.get(file_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn finish(&self, file_id: &str) {
        self.active.lock().await.remove(file_id);
    }

    pub async fn is_running(&self, file_id: &str) -> bool {
        self.active.lock().await.contains_key(file_id)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub files: Arc<FileStore>,
    pub labels: Arc<LabelStore>,
    pub conversations: Arc<ConversationStore>,
    pub queue: Arc<dyn Enqueuer>,
    pub providers: ProviderRegistry,
    pub events: EventBus,
    pub runs: RunRegistry,
}

/// Binds `addr` and serves the router until a ctrl-c signal arrives,
/// draining in-flight requests before returning.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = http::app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "labeling-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        futures::future::pending::<()>().await;
    }
}
