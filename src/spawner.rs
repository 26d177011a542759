//! Agent spawn port
//!
//! Spawning is best-effort. Callers run it off the session lock and only log
//! failures.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{AppError, Result};

/// Everything a launcher needs to start one agent on one session
#[derive(Debug, Clone, Serialize)]
pub struct SpawnRequest {
    pub session_id: Uuid,
    pub agent: AgentConfig,
    pub context: String,
    pub callback_url: String,
    pub token: String,
}

#[async_trait]
pub trait Spawner: Send + Sync {
    async fn spawn(&self, request: SpawnRequest) -> Result<()>;
}

/// POSTs spawn requests to an external launcher
pub struct HttpSpawner {
    client: Client,
    launch_url: String,
}

impl HttpSpawner {
    pub fn new(launch_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            launch_url: launch_url.into(),
        }
    }
}

#[async_trait]
impl Spawner for HttpSpawner {
    async fn spawn(&self, request: SpawnRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.launch_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Spawn(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Spawn(format!(
                "Failed to spawn {}: {} - {}",
                request.agent.id, status, text
            )));
        }

        Ok(())
    }
}

/// Spawner for deployments without a launcher: spawns are logged and kept
#[derive(Default, Clone)]
pub struct LoggingSpawner {
    requests: Arc<Mutex<Vec<SpawnRequest>>>,
}

impl LoggingSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far, oldest first
    pub async fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Spawner for LoggingSpawner {
    async fn spawn(&self, request: SpawnRequest) -> Result<()> {
        tracing::info!(
            session_id = %request.session_id,
            agent_id = %request.agent.id,
            callback = %request.callback_url,
            "Spawn requested (no launcher configured)"
        );
        self.requests.lock().await.push(request);
        Ok(())
    }
}
