//! Phase transition table and its side effects

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::Orchestrator;
use crate::error::{AppError, Result};
use crate::events::CouncilEvent;
use crate::models::{Decision, DecisionOutcome, Session, SessionPhase};

/// Phases reachable from `from`. Refinement drops out when disabled.
pub fn valid_targets(from: SessionPhase, refinement_enabled: bool) -> Vec<SessionPhase> {
    use SessionPhase::*;

    let targets: &[SessionPhase] = match from {
        Investigation => &[Proposal, Closed],
        Proposal => &[Discussion, Closed],
        Discussion => &[Refinement, Voting, Closed],
        Refinement => &[Discussion, Voting, Closed],
        Voting => &[Review, Discussion, Refinement, Decided, Closed],
        Review => &[Decided, Discussion, Refinement, Closed],
        Decided => &[Closed],
        Closed => &[],
    };

    targets
        .iter()
        .copied()
        .filter(|phase| refinement_enabled || *phase != Refinement)
        .collect()
}

pub fn can_transition(from: SessionPhase, to: SessionPhase, refinement_enabled: bool) -> bool {
    valid_targets(from, refinement_enabled).contains(&to)
}

impl Orchestrator {
    /// Move a session to `to`, reading its latest persisted phase first
    pub async fn transition_phase(&self, session_id: Uuid, to: SessionPhase) -> Result<Session> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.store.get_session(session_id).await?;
        self.transition_locked(&mut session, to).await?;
        Ok(session)
    }

    pub async fn close_session(&self, session_id: Uuid) -> Result<Session> {
        self.transition_phase(session_id, SessionPhase::Closed).await
    }

    /// Validate, apply entry effects, persist and announce. Caller holds the session lock.
    pub(crate) async fn transition_locked(&self, session: &mut Session, to: SessionPhase) -> Result<()> {
        let from = session.phase;
        if !can_transition(from, to, self.config.refinement.enabled) {
            return Err(AppError::InvalidTransition { from, to });
        }

        let merged = if from == SessionPhase::Refinement && to == SessionPhase::Voting {
            self.merged_proposal(session).await?
        } else {
            None
        };
        if let Some(proposal) = &merged {
            session.active_proposal_id = Some(proposal.id);
        }

        match to {
            SessionPhase::Discussion => session.round += 1,
            SessionPhase::Voting => session.voting_round += 1,
            _ => {}
        }
        session.phase = to;
        session.updated_at = Utc::now();
        self.store.update_session(session).await?;

        // Saved after the session so a failed update leaves no stray proposal
        if let Some(proposal) = merged {
            let proposal = self.post(session, proposal).await?;
            info!(
                session_id = %session.id,
                proposal_id = %proposal.id,
                "Accepted amendments merged into a new proposal"
            );
        }

        if to == SessionPhase::Review && self.store.get_decision(session.id).await?.is_none() {
            let decision = Decision::new(
                session.id,
                DecisionOutcome::Escalated,
                "Advanced to review without a concluded vote",
            );
            self.store.save_decision(&decision).await?;
            self.bus.publish(CouncilEvent::DecisionPendingReview { decision });
        }

        if to.is_terminal() {
            self.registry.release_session(session.id).await;
        }

        info!(
            session_id = %session.id,
            from = %from,
            to = %to,
            round = session.round,
            "Session phase changed"
        );
        self.bus.publish(CouncilEvent::PhaseChanged {
            session_id: session.id,
            from,
            to,
            round: session.round,
            voting_round: session.voting_round,
        });

        Ok(())
    }
}
