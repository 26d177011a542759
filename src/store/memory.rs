//! In-memory store
//!
//! Same contract as the SQLite store, including duplicate-vote rejection.
//! Used by tests and by servers started with `memory` as the database url.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::CouncilStore;
use crate::error::{AppError, Result};
use crate::models::{
    AmendmentStatus, Decision, EscalationEvent, InboundEvent, Message, MessageType, Session, Vote,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    /// Insertion order doubles as creation order
    session_order: RwLock<Vec<Uuid>>,
    messages: RwLock<Vec<Message>>,
    votes: RwLock<Vec<Vote>>,
    decisions: RwLock<HashMap<Uuid, Decision>>,
    escalations: RwLock<Vec<EscalationEvent>>,
    inbound: RwLock<HashMap<Uuid, InboundEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouncilStore for MemoryStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.insert(session.id, session.clone()).is_none() {
            self.session_order.write().await.push(session.id);
        }
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Session {} not found", session.id))),
        }
    }

    async fn get_session(&self, id: Uuid) -> Result<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    async fn list_sessions(&self, council_id: &str) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let order = self.session_order.read().await;
        Ok(order
            .iter()
            .rev()
            .filter_map(|id| sessions.get(id))
            .filter(|s| s.council_id == council_id)
            .cloned()
            .collect())
    }

    async fn save_message(&self, message: &Message) -> Result<()> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> Result<Message> {
        let messages = self.messages.read().await;
        messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", id)))
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn update_amendment_status(&self, id: Uuid, status: AmendmentStatus) -> Result<()> {
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|m| m.id == id && m.message_type == MessageType::Amendment)
            .ok_or_else(|| AppError::NotFound(format!("Amendment {} not found", id)))?;
        message.amendment_status = Some(status);
        Ok(())
    }

    async fn save_vote(&self, vote: &Vote) -> Result<()> {
        let mut votes = self.votes.write().await;
        let duplicate = votes.iter().any(|v| {
            v.session_id == vote.session_id
                && v.agent_id == vote.agent_id
                && v.voting_round == vote.voting_round
        });
        if duplicate {
            return Err(AppError::DuplicateVote {
                agent_id: vote.agent_id.clone(),
                round: vote.voting_round,
            });
        }
        votes.push(vote.clone());
        Ok(())
    }

    async fn list_votes(&self, session_id: Uuid) -> Result<Vec<Vote>> {
        let votes = self.votes.read().await;
        Ok(votes
            .iter()
            .filter(|v| v.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn save_decision(&self, decision: &Decision) -> Result<()> {
        let mut decisions = self.decisions.write().await;
        if decisions.contains_key(&decision.session_id) {
            return Err(AppError::Internal(format!(
                "Session {} already has a decision",
                decision.session_id
            )));
        }
        decisions.insert(decision.session_id, decision.clone());
        Ok(())
    }

    async fn update_decision(&self, decision: &Decision) -> Result<()> {
        let mut decisions = self.decisions.write().await;
        match decisions.get_mut(&decision.session_id) {
            Some(existing) if existing.id == decision.id => {
                *existing = decision.clone();
                Ok(())
            }
            _ => Err(AppError::NotFound(format!("Decision {} not found", decision.id))),
        }
    }

    async fn get_decision(&self, session_id: Uuid) -> Result<Option<Decision>> {
        Ok(self.decisions.read().await.get(&session_id).cloned())
    }

    async fn save_escalation_event(&self, event: &EscalationEvent) -> Result<()> {
        self.escalations.write().await.push(event.clone());
        Ok(())
    }

    async fn list_escalation_events(&self, session_id: Uuid) -> Result<Vec<EscalationEvent>> {
        let events = self.escalations.read().await;
        Ok(events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn save_inbound_event(&self, event: &InboundEvent) -> Result<()> {
        self.inbound.write().await.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_inbound_event(&self, id: Uuid) -> Result<InboundEvent> {
        self.inbound
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Inbound event {} not found", id)))
    }
}
