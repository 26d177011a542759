use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::{can_transition, Orchestrator};
use crate::error::Result;
use crate::escalation::SessionControl;
use crate::events::{AssignmentRole, CouncilEvent};
use crate::models::{Decision, DecisionOutcome, Session, SessionPhase};

#[async_trait]
impl SessionControl for Orchestrator {
    async fn session(&self, session_id: Uuid) -> Result<Session> {
        self.store.get_session(session_id).await
    }

    /// Record an escalated decision and hand the session to a human if the
    /// table allows it from here
    async fn escalate_to_human(&self, session_id: Uuid, message: &str) -> Result<Decision> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.load_open(session_id, "escalate").await?;

        let decision = self
            .record_decision(session_id, DecisionOutcome::Escalated, message)
            .await?;
        let refinement = self.config.refinement.enabled;
        if session.phase != SessionPhase::Review {
            if can_transition(session.phase, SessionPhase::Review, refinement) {
                self.transition_locked(&mut session, SessionPhase::Review).await?;
            } else {
                warn!(
                    session_id = %session_id,
                    phase = %session.phase,
                    "Escalated decision recorded but session cannot move to review"
                );
            }
        }

        self.bus.publish(CouncilEvent::DecisionPendingReview {
            decision: decision.clone(),
        });
        Ok(decision)
    }

    async fn restart_discussion(&self, session_id: Uuid) -> Result<Session> {
        self.transition_phase(session_id, SessionPhase::Discussion).await
    }

    /// Bring another agent into the session and brief it
    async fn add_agent(&self, session_id: Uuid, agent_id: &str, rationale: &str) -> Result<()> {
        let agent = self.registry.require(agent_id).await?;
        let session = {
            let _guard = self.lock_session(session_id).await;
            let mut session = self.load_open(session_id, "add agents").await?;
            if session.add_participant(agent_id) {
                session.updated_at = chrono::Utc::now();
                self.store.update_session(&session).await?;
            }
            self.post_system_message(&session, agent_id, rationale).await?;
            session
        };

        info!(session_id = %session_id, agent_id, "Agent added by escalation");
        self.assign_agent(&session, &agent, AssignmentRole::Added, Some(rationale))
            .await
    }

    /// Force a decision; closes the session when `decided` is unreachable
    async fn auto_decide(
        &self,
        session_id: Uuid,
        outcome: DecisionOutcome,
        summary: &str,
    ) -> Result<Decision> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.load_open(session_id, "decide").await?;

        let decision = self.record_decision(session_id, outcome, summary).await?;
        let target = if can_transition(session.phase, SessionPhase::Decided, self.config.refinement.enabled) {
            SessionPhase::Decided
        } else {
            warn!(
                session_id = %session_id,
                phase = %session.phase,
                "decided unreachable from current phase; closing session"
            );
            SessionPhase::Closed
        };
        self.transition_locked(&mut session, target).await?;

        info!(session_id = %session_id, outcome = outcome.as_str(), "Decision recorded automatically");
        self.bus.publish(CouncilEvent::DecisionRecorded {
            decision: decision.clone(),
        });
        Ok(decision)
    }
}
