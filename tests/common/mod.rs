//! Shared wiring for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use council::config::{AgentConfig, CouncilConfig};
use council::error::{AppError, Result};
use council::escalation::RecordingNotifier;
use council::events::CouncilEvent;
use council::models::{
    AmendmentStatus, Decision, EscalationEvent, InboundEvent, Message, Session, SessionPhase, Vote,
};
use council::router::EventRoute;
use council::spawner::LoggingSpawner;
use council::store::{CouncilStore, MemoryStore};
use council::AppState;

pub fn agent(id: &str) -> AgentConfig {
    AgentConfig::new(id)
}

/// Three agents: an architect who proposes, a security reviewer with veto
/// power and a performance reviewer. Refinement off, no human gate.
pub fn council_config() -> CouncilConfig {
    let mut config = CouncilConfig::new("platform");
    config.council.name = "Platform Council".to_string();
    config.deliberation.require_human_approval = false;

    let mut architect = agent("architect");
    architect.can_propose = true;
    architect.expertise = vec!["api".to_string()];
    let mut security = agent("security");
    security.can_veto = true;
    security.expertise = vec!["auth".to_string()];
    let perf = agent("perf");
    config.agents = vec![architect, security, perf];

    config.event_routing = vec![EventRoute {
        source: "github".to_string(),
        event_type: Some("issues".to_string()),
        labels: vec!["security".to_string()],
        lead: "architect".to_string(),
        consult: vec!["security".to_string(), "perf".to_string()],
        topics: vec!["auth".to_string()],
    }];
    config
}

pub struct TestCouncil {
    pub state: Arc<AppState>,
    pub spawner: LoggingSpawner,
    pub notifier: RecordingNotifier,
}

impl TestCouncil {
    pub async fn start(config: CouncilConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(config: CouncilConfig, store: Arc<dyn CouncilStore>) -> Self {
        let spawner = LoggingSpawner::new();
        let notifier = RecordingNotifier::new();
        let state = AppState::new(
            config,
            store,
            Arc::new(spawner.clone()),
            Arc::new(notifier.clone()),
        )
        .await;
        Self {
            state,
            spawner,
            notifier,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<CouncilEvent> {
        self.state.bus.subscribe()
    }
}

/// Wait for the next event matching `pred`, failing after two seconds
pub async fn expect_event<F>(rx: &mut broadcast::Receiver<CouncilEvent>, mut pred: F) -> CouncilEvent
where
    F: FnMut(&CouncilEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll until the session reaches `phase`
pub async fn wait_for_phase(council: &TestCouncil, session_id: uuid::Uuid, phase: SessionPhase) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let session = council
                .state
                .orchestrator
                .get_session(session_id)
                .await
                .unwrap();
            if session.phase == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never reached phase");
}

/// Memory store whose session updates can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_updates: AtomicBool,
}

impl FlakyStore {
    pub fn fail_session_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CouncilStore for FlakyStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        self.inner.save_session(session).await
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::Internal("session update refused".to_string()));
        }
        self.inner.update_session(session).await
    }

    async fn get_session(&self, id: Uuid) -> Result<Session> {
        self.inner.get_session(id).await
    }

    async fn list_sessions(&self, council_id: &str) -> Result<Vec<Session>> {
        self.inner.list_sessions(council_id).await
    }

    async fn save_message(&self, message: &Message) -> Result<()> {
        self.inner.save_message(message).await
    }

    async fn get_message(&self, id: Uuid) -> Result<Message> {
        self.inner.get_message(id).await
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        self.inner.list_messages(session_id).await
    }

    async fn update_amendment_status(&self, id: Uuid, status: AmendmentStatus) -> Result<()> {
        self.inner.update_amendment_status(id, status).await
    }

    async fn save_vote(&self, vote: &Vote) -> Result<()> {
        self.inner.save_vote(vote).await
    }

    async fn list_votes(&self, session_id: Uuid) -> Result<Vec<Vote>> {
        self.inner.list_votes(session_id).await
    }

    async fn save_decision(&self, decision: &Decision) -> Result<()> {
        self.inner.save_decision(decision).await
    }

    async fn update_decision(&self, decision: &Decision) -> Result<()> {
        self.inner.update_decision(decision).await
    }

    async fn get_decision(&self, session_id: Uuid) -> Result<Option<Decision>> {
        self.inner.get_decision(session_id).await
    }

    async fn save_escalation_event(&self, event: &EscalationEvent) -> Result<()> {
        self.inner.save_escalation_event(event).await
    }

    async fn list_escalation_events(&self, session_id: Uuid) -> Result<Vec<EscalationEvent>> {
        self.inner.list_escalation_events(session_id).await
    }

    async fn save_inbound_event(&self, event: &InboundEvent) -> Result<()> {
        self.inner.save_inbound_event(event).await
    }

    async fn get_inbound_event(&self, id: Uuid) -> Result<InboundEvent> {
        self.inner.get_inbound_event(id).await
    }
}
