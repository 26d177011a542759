//! In-process notification stream
//!
//! Every state change the engine makes is published here. The escalation
//! engine and websocket observers are the subscribers.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    AmendmentStatus, Decision, EscalationEvent, InboundEvent, Message, Session, SessionPhase, Vote,
};
use crate::voting::Tally;

/// How an agent came to be part of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole {
    Lead,
    Consult,
    /// Pulled in by an escalation rule
    Added,
}

/// Events emitted by the orchestrator and the escalation engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum CouncilEvent {
    #[serde(rename = "session:created")]
    SessionCreated { session: Session },
    #[serde(rename = "session:phase_changed")]
    PhaseChanged {
        session_id: Uuid,
        from: SessionPhase,
        to: SessionPhase,
        round: u32,
        voting_round: u32,
    },
    /// `recipients` is the policy-filtered delivery set; observers see every message
    #[serde(rename = "message:posted")]
    MessagePosted {
        message: Message,
        recipients: Vec<String>,
    },
    #[serde(rename = "amendment:resolved")]
    AmendmentResolved {
        session_id: Uuid,
        amendment_id: Uuid,
        status: AmendmentStatus,
        resolved_by: String,
    },
    #[serde(rename = "vote:cast")]
    VoteCast { vote: Vote },
    #[serde(rename = "vote:concluded")]
    VoteConcluded { session_id: Uuid, tally: Tally },
    #[serde(rename = "decision:pending_review")]
    DecisionPendingReview { decision: Decision },
    #[serde(rename = "decision:recorded")]
    DecisionRecorded { decision: Decision },
    #[serde(rename = "event:received")]
    InboundReceived { event: InboundEvent },
    #[serde(rename = "escalation:fired")]
    EscalationFired { escalation: EscalationEvent },
    #[serde(rename = "agent:assigned")]
    AgentAssigned {
        session_id: Uuid,
        agent_id: String,
        role: AssignmentRole,
    },
}

impl CouncilEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CouncilEvent::SessionCreated { .. } => "session:created",
            CouncilEvent::PhaseChanged { .. } => "session:phase_changed",
            CouncilEvent::MessagePosted { .. } => "message:posted",
            CouncilEvent::AmendmentResolved { .. } => "amendment:resolved",
            CouncilEvent::VoteCast { .. } => "vote:cast",
            CouncilEvent::VoteConcluded { .. } => "vote:concluded",
            CouncilEvent::DecisionPendingReview { .. } => "decision:pending_review",
            CouncilEvent::DecisionRecorded { .. } => "decision:recorded",
            CouncilEvent::InboundReceived { .. } => "event:received",
            CouncilEvent::EscalationFired { .. } => "escalation:fired",
            CouncilEvent::AgentAssigned { .. } => "agent:assigned",
        }
    }

    /// Session the event belongs to; inbound events have none
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            CouncilEvent::SessionCreated { session } => Some(session.id),
            CouncilEvent::PhaseChanged { session_id, .. }
            | CouncilEvent::AmendmentResolved { session_id, .. }
            | CouncilEvent::VoteConcluded { session_id, .. }
            | CouncilEvent::AgentAssigned { session_id, .. } => Some(*session_id),
            CouncilEvent::MessagePosted { message, .. } => Some(message.session_id),
            CouncilEvent::VoteCast { vote } => Some(vote.session_id),
            CouncilEvent::DecisionPendingReview { decision }
            | CouncilEvent::DecisionRecorded { decision } => Some(decision.session_id),
            CouncilEvent::EscalationFired { escalation } => Some(escalation.session_id),
            CouncilEvent::InboundReceived { .. } => None,
        }
    }
}

/// Multi-subscriber broadcast of [`CouncilEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CouncilEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CouncilEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: CouncilEvent) {
        tracing::trace!(kind = event.kind(), "publish");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_preserves_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let session = Session::new("c", "t", SessionPhase::Proposal);
        let id = session.id;

        bus.publish(CouncilEvent::SessionCreated { session });
        bus.publish(CouncilEvent::PhaseChanged {
            session_id: id,
            from: SessionPhase::Proposal,
            to: SessionPhase::Discussion,
            round: 1,
            voting_round: 0,
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind(), "session:created");
        assert_eq!(second.kind(), "session:phase_changed");
        assert_eq!(second.session_id(), Some(id));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(CouncilEvent::InboundReceived {
            event: InboundEvent::new("github", "issues", serde_json::json!({})),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_serialized_type_tag() {
        let event = CouncilEvent::AgentAssigned {
            session_id: Uuid::new_v4(),
            agent_id: "sec".to_string(),
            role: AssignmentRole::Consult,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "agent:assigned");
        assert_eq!(value["role"], "consult");
    }
}
