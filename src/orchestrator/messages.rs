use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::Orchestrator;
use crate::error::{AppError, Result};
use crate::models::{Message, MessageType, Session, SessionPhase};

impl Orchestrator {
    /// Load a session that can still take contributions
    pub(super) async fn load_open(&self, session_id: Uuid, operation: &'static str) -> Result<Session> {
        let session = self.store.get_session(session_id).await?;
        if session.phase.is_terminal() {
            return Err(AppError::WrongPhase {
                operation,
                phase: session.phase,
            });
        }
        Ok(session)
    }

    pub async fn submit_finding(&self, session_id: Uuid, agent_id: &str, body: &str) -> Result<Message> {
        let _guard = self.lock_session(session_id).await;
        let session = self.load_open(session_id, "submit findings").await?;
        self.registry.require(agent_id).await?;

        let message = Message::new(session_id, agent_id, MessageType::Finding, body);
        self.post(&session, message).await
    }

    /// Post a discussion or consultation message, optionally to one agent
    pub async fn send_message(
        &self,
        session_id: Uuid,
        from: &str,
        to: Option<&str>,
        message_type: MessageType,
        body: &str,
    ) -> Result<Message> {
        if !matches!(message_type, MessageType::Discussion | MessageType::Consultation) {
            return Err(AppError::BadRequest(format!(
                "{} messages have their own operation",
                message_type.as_str()
            )));
        }

        let _guard = self.lock_session(session_id).await;
        let session = self.load_open(session_id, "send messages").await?;
        self.registry.require(from).await?;
        if let Some(to) = to {
            self.registry.require(to).await?;
        }

        let message =
            Message::new(session_id, from, message_type, body).to(to.map(str::to_string));
        self.post(&session, message).await
    }

    /// Record a proposal and make it the active one.
    ///
    /// Early sessions advance through `proposal` into `discussion`.
    pub async fn create_proposal(&self, session_id: Uuid, agent_id: &str, body: &str) -> Result<Message> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.store.get_session(session_id).await?;
        if !matches!(
            session.phase,
            SessionPhase::Investigation | SessionPhase::Proposal | SessionPhase::Discussion
        ) {
            return Err(AppError::WrongPhase {
                operation: "create proposals",
                phase: session.phase,
            });
        }

        let agent = self.registry.require(agent_id).await?;
        if !agent.can_propose && !session.is_lead(agent_id) {
            return Err(AppError::Forbidden(format!(
                "Agent {} may not create proposals",
                agent_id
            )));
        }

        let message = Message::new(session_id, agent_id, MessageType::Proposal, body);
        let message = self.post(&session, message).await?;

        session.active_proposal_id = Some(message.id);
        session.updated_at = Utc::now();
        info!(session_id = %session_id, proposal_id = %message.id, agent_id, "Proposal recorded");

        if session.phase == SessionPhase::Investigation {
            self.transition_locked(&mut session, SessionPhase::Proposal).await?;
        }
        if session.phase == SessionPhase::Proposal {
            self.transition_locked(&mut session, SessionPhase::Discussion).await?;
        } else {
            self.store.update_session(&session).await?;
        }

        Ok(message)
    }

    /// Write an engine-authored message addressed to one agent
    pub(super) async fn post_system_message(
        &self,
        session: &Session,
        to: &str,
        body: &str,
    ) -> Result<Message> {
        let message = Message::new(session.id, super::SYSTEM_SENDER, MessageType::Consultation, body)
            .to(Some(to.to_string()));
        self.post(session, message).await
    }
}
