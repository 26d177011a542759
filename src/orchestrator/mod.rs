//! Session orchestrator
//!
//! Single owner of session state. Every mutation of a session runs under
//! that session's lock, so agent actions and timer-driven escalations on
//! the same session are totally ordered. Spawning runs on detached tasks
//! outside the lock.

mod amendments;
mod control;
mod messages;
pub mod transitions;
mod voting;

pub use transitions::{can_transition, valid_targets};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AgentConfig, CouncilConfig};
use crate::error::{AppError, Result};
use crate::events::{AssignmentRole, CouncilEvent, EventBus};
use crate::models::{
    Decision, EscalationEvent, InboundEvent, Message, NewSession, Session, SessionPhase, Vote,
};
use crate::registry::AgentRegistry;
use crate::router::{route, CommunicationPolicy};
use crate::spawner::{SpawnRequest, Spawner};
use crate::store::CouncilStore;
use crate::voting::Scheme;

/// Sender id for messages the engine itself writes
pub const SYSTEM_SENDER: &str = "system";

pub struct Orchestrator {
    config: Arc<CouncilConfig>,
    scheme: Scheme,
    policy: CommunicationPolicy,
    store: Arc<dyn CouncilStore>,
    registry: Arc<AgentRegistry>,
    spawner: Arc<dyn Spawner>,
    bus: EventBus,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<CouncilConfig>,
        store: Arc<dyn CouncilStore>,
        registry: Arc<AgentRegistry>,
        spawner: Arc<dyn Spawner>,
        bus: EventBus,
    ) -> Self {
        Self {
            scheme: config.voting.scheme(),
            policy: CommunicationPolicy::from_config(&config.communication),
            config,
            store,
            registry,
            spawner,
            bus,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    async fn lock_session(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Clones only happen under this map lock, so a count of one means
            // nobody holds or waits on the entry
            locks.retain(|id, lock| *id == session_id || Arc::strong_count(lock) > 1);
            locks.entry(session_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    // Session lifecycle

    /// Open a session by hand
    pub async fn start_session(&self, request: NewSession) -> Result<Session> {
        self.open_session(request, None).await
    }

    /// Record an inbound event and open a session if a route matches it
    pub async fn ingest_event(&self, event: InboundEvent) -> Result<Option<Session>> {
        self.store.save_inbound_event(&event).await?;
        self.bus.publish(CouncilEvent::InboundReceived {
            event: event.clone(),
        });

        let Some(assignment) = route(&event, &self.config.event_routing) else {
            debug!(
                source = %event.source,
                event_type = %event.event_type,
                "No route matched inbound event"
            );
            return Ok(None);
        };
        debug!(event_id = %event.id, lead = %assignment.lead, "Inbound event routed");

        let note = format!(
            "Triggered by {} {} event:\n{}",
            event.source,
            event.event_type,
            serde_json::to_string_pretty(&event.payload).unwrap_or_default()
        );
        let request = NewSession {
            title: event.title(),
            lead: Some(assignment.lead),
            consult: assignment.consult,
            topics: assignment.topics,
            phase: Some(SessionPhase::Investigation),
            trigger_event_id: Some(event.id),
        };
        self.open_session(request, Some(note)).await.map(Some)
    }

    async fn open_session(&self, request: NewSession, note: Option<String>) -> Result<Session> {
        if request.title.trim().is_empty() {
            return Err(AppError::BadRequest("Session title must not be empty".to_string()));
        }
        let phase = request.phase.unwrap_or(self.config.deliberation.initial_phase);
        if phase.is_terminal() {
            return Err(AppError::BadRequest(format!(
                "Sessions cannot start in {}",
                phase
            )));
        }

        let mut assigned = Vec::new();
        if let Some(lead) = &request.lead {
            assigned.push((self.registry.require(lead).await?, AssignmentRole::Lead));
        }
        for agent_id in &request.consult {
            assigned.push((self.registry.require(agent_id).await?, AssignmentRole::Consult));
        }

        let mut session = Session::new(self.config.council.id.clone(), request.title, phase);
        session.lead_agent_id = request.lead;
        session.trigger_event_id = request.trigger_event_id;
        session.topics = request.topics;
        assigned.retain(|(agent, _)| session.add_participant(&agent.id));

        self.store.save_session(&session).await?;
        info!(
            session_id = %session.id,
            title = %session.title,
            phase = %session.phase,
            participants = session.participants.len(),
            "Session created"
        );
        self.bus.publish(CouncilEvent::SessionCreated {
            session: session.clone(),
        });

        for (agent, role) in assigned {
            self.assign_agent(&session, &agent, role, note.as_deref()).await?;
        }

        Ok(session)
    }

    /// Register the assignment, issue a token and spawn in the background
    async fn assign_agent(
        &self,
        session: &Session,
        agent: &AgentConfig,
        role: AssignmentRole,
        note: Option<&str>,
    ) -> Result<()> {
        self.registry.assign(&agent.id, session.id).await?;
        let token = self.registry.issue_token(&agent.id, session.id).await?;
        self.bus.publish(CouncilEvent::AgentAssigned {
            session_id: session.id,
            agent_id: agent.id.clone(),
            role,
        });

        let request = SpawnRequest {
            session_id: session.id,
            agent: agent.clone(),
            context: self.spawn_context(session, agent, role, note),
            callback_url: self.config.spawner.callback_url.clone(),
            token,
        };
        let spawner = self.spawner.clone();
        let session_id = session.id;
        let agent_id = agent.id.clone();
        tokio::spawn(async move {
            if let Err(e) = spawner.spawn(request).await {
                warn!(session_id = %session_id, agent_id = %agent_id, "Spawn failed: {}", e);
            }
        });

        Ok(())
    }

    fn spawn_context(
        &self,
        session: &Session,
        agent: &AgentConfig,
        role: AssignmentRole,
        note: Option<&str>,
    ) -> String {
        let role = match role {
            AssignmentRole::Lead => "lead",
            AssignmentRole::Consult => "consultant",
            AssignmentRole::Added => "additional reviewer",
        };
        let mut context = format!(
            "You are {} ({}) on council {}.\nSession: {} [{}]\nPhase: {}\nYour part: {}\n",
            agent.display_name(),
            agent.role,
            self.config.council.name,
            session.title,
            session.id,
            session.phase,
            role,
        );
        if !session.topics.is_empty() {
            context.push_str(&format!("Topics: {}\n", session.topics.join(", ")));
        }
        if let Some(note) = note {
            context.push('\n');
            context.push_str(note);
        }
        context
    }

    // Read models

    pub async fn get_session(&self, session_id: Uuid) -> Result<Session> {
        self.store.get_session(session_id).await
    }

    /// Sessions of this council, newest first
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.store.list_sessions(&self.config.council.id).await
    }

    pub async fn messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        self.store.get_session(session_id).await?;
        self.store.list_messages(session_id).await
    }

    /// Messages the router delivers to `agent_id`, in publish order
    pub async fn inbox(&self, session_id: Uuid, agent_id: &str) -> Result<Vec<Message>> {
        let session = self.store.get_session(session_id).await?;
        self.registry.require(agent_id).await?;
        let audience = self.audience();

        Ok(self
            .store
            .list_messages(session_id)
            .await?
            .into_iter()
            .filter(|m| {
                self.recipients(m, audience)
                    .iter()
                    .any(|r| r == agent_id)
            })
            .collect())
    }

    pub async fn votes(&self, session_id: Uuid) -> Result<Vec<Vote>> {
        self.store.get_session(session_id).await?;
        self.store.list_votes(session_id).await
    }

    pub async fn decision(&self, session_id: Uuid) -> Result<Option<Decision>> {
        self.store.get_decision(session_id).await
    }

    pub async fn escalations(&self, session_id: Uuid) -> Result<Vec<EscalationEvent>> {
        self.store.list_escalation_events(session_id).await
    }

    /// Resolve an agent token for an inbound action
    pub async fn authenticate(&self, token: &str) -> Result<AgentConfig> {
        self.registry.authenticate(token).await
    }

    // Delivery helpers

    /// Broadcasts reach the whole council, filtered by the policy. Participants
    /// only decide who must vote.
    fn audience(&self) -> &[String] {
        self.registry.agent_ids()
    }

    fn recipients(&self, message: &Message, audience: &[String]) -> Vec<String> {
        if message.from_agent_id == SYSTEM_SENDER {
            return match &message.to_agent_id {
                Some(to) => vec![to.clone()],
                None => audience.to_vec(),
            };
        }
        self.policy
            .recipients(&message.from_agent_id, message.to_agent_id.as_deref(), audience)
    }

    /// Persist a message and announce it with its delivery set
    async fn post(&self, session: &Session, message: Message) -> Result<Message> {
        let recipients = self.recipients(&message, self.audience());
        self.store.save_message(&message).await?;
        debug!(
            session_id = %session.id,
            message_id = %message.id,
            kind = message.message_type.as_str(),
            delivered = recipients.len(),
            "Message posted"
        );
        self.bus.publish(CouncilEvent::MessagePosted {
            message: message.clone(),
            recipients,
        });
        Ok(message)
    }
}
