//! Council - multi-agent deliberation engine

pub mod config;
pub mod error;
pub mod escalation;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod spawner;
pub mod store;
pub mod voting;
pub mod websocket;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::CouncilConfig;
use crate::escalation::{EscalationEngine, Notifier};
use crate::events::EventBus;
use crate::orchestrator::Orchestrator;
use crate::registry::AgentRegistry;
use crate::spawner::Spawner;
use crate::store::CouncilStore;

/// Application state shared across handlers
pub struct AppState {
    pub config: Arc<CouncilConfig>,
    pub store: Arc<dyn CouncilStore>,
    pub bus: EventBus,
    pub registry: Arc<AgentRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub escalation: Arc<EscalationEngine>,
}

impl AppState {
    /// Wire the engine together and start the escalation listener
    pub async fn new(
        config: CouncilConfig,
        store: Arc<dyn CouncilStore>,
        spawner: Arc<dyn Spawner>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let bus = EventBus::new(config.server.event_buffer);
        let registry = Arc::new(AgentRegistry::new(&config.agents));
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            store.clone(),
            registry.clone(),
            spawner,
            bus.clone(),
        ));
        let escalation = EscalationEngine::new(
            &config,
            orchestrator.clone(),
            store.clone(),
            bus.clone(),
            notifier,
        );
        escalation.start().await;

        Arc::new(Self {
            config,
            store,
            bus,
            registry,
            orchestrator,
            escalation,
        })
    }

    pub async fn shutdown(&self) {
        self.escalation.shutdown().await;
    }
}

/// Routes served by the council binary
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket::handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
