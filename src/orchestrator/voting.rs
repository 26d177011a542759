use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

use super::Orchestrator;
use crate::error::{AppError, Result};
use crate::events::CouncilEvent;
use crate::models::{
    Decision, DecisionOutcome, ReviewAction, Session, SessionPhase, Vote, VoteValue,
};
use crate::voting::{effective_weight, tally, Ballot, Roster, Tally, VoterProfile};

impl Orchestrator {
    /// Record a ballot for the current voting round and conclude once every
    /// required voter has voted.
    pub async fn cast_vote(
        &self,
        session_id: Uuid,
        agent_id: &str,
        value: VoteValue,
        reasoning: &str,
    ) -> Result<Vote> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.store.get_session(session_id).await?;
        if session.phase != SessionPhase::Voting {
            return Err(AppError::WrongPhase {
                operation: "vote",
                phase: session.phase,
            });
        }
        self.registry.require(agent_id).await?;

        if !self.scheme.accepts(value) {
            return Err(AppError::BadRequest(format!(
                "{} is not a valid ballot under {}",
                value.as_str(),
                self.scheme.name().as_str()
            )));
        }

        let required = self.required_voters(&session);
        if !required.iter().any(|id| id == agent_id) {
            return Err(AppError::Forbidden(format!(
                "Agent {} is not a voter in session {}",
                agent_id, session_id
            )));
        }

        let mut ballots: Vec<Vote> = self
            .store
            .list_votes(session_id)
            .await?
            .into_iter()
            .filter(|v| v.voting_round == session.voting_round)
            .collect();
        if ballots.iter().any(|v| v.agent_id == agent_id) {
            return Err(AppError::DuplicateVote {
                agent_id: agent_id.to_string(),
                round: session.voting_round,
            });
        }

        let vote = Vote::new(session_id, agent_id, value, reasoning, session.voting_round);
        self.store.save_vote(&vote).await?;
        debug!(session_id = %session_id, agent_id, value = value.as_str(), "Vote cast");
        self.bus.publish(CouncilEvent::VoteCast { vote: vote.clone() });
        ballots.push(vote.clone());

        let voted: HashSet<&str> = ballots.iter().map(|v| v.agent_id.as_str()).collect();
        if required.iter().all(|id| voted.contains(id.as_str())) {
            self.conclude_vote(&mut session, &ballots).await?;
        }

        Ok(vote)
    }

    /// Participants, or every configured agent when none were assigned
    pub(super) fn required_voters(&self, session: &Session) -> Vec<String> {
        if session.participants.is_empty() {
            debug!(session_id = %session.id, "No participants; every council agent votes");
            self.registry.agent_ids().to_vec()
        } else {
            session.participants.clone()
        }
    }

    /// Effective voter profiles for this session's topics
    pub(super) async fn roster(&self, session: &Session) -> Roster {
        self.registry
            .configs()
            .await
            .into_iter()
            .map(|agent| {
                let weight = effective_weight(
                    agent.weight,
                    &agent.expertise,
                    &session.topics,
                    &self.config.voting.dynamic_weights,
                );
                (
                    agent.id,
                    VoterProfile {
                        weight,
                        can_veto: agent.can_veto,
                    },
                )
            })
            .collect()
    }

    async fn conclude_vote(&self, session: &mut Session, votes: &[Vote]) -> Result<Tally> {
        let ballots: Vec<Ballot> = votes.iter().map(Ballot::from).collect();
        let roster = self.roster(session).await;
        let result = tally(&self.scheme, &ballots, &roster, self.config.voting.quorum);

        info!(
            session_id = %session.id,
            voting_round = session.voting_round,
            summary = %result.summary,
            "Vote concluded"
        );
        self.bus.publish(CouncilEvent::VoteConcluded {
            session_id: session.id,
            tally: result.clone(),
        });

        match result.outcome {
            None => {
                let summary = format!(
                    "Vote did not reach quorum ({} of {} ballots)",
                    result.ballots, result.quorum
                );
                let decision = self
                    .record_decision(session.id, DecisionOutcome::Escalated, &summary)
                    .await?;
                self.transition_locked(session, SessionPhase::Review).await?;
                self.bus.publish(CouncilEvent::DecisionPendingReview { decision });
            }
            Some(DecisionOutcome::Rejected)
                if self.config.refinement.enabled && !result.veto_exercised =>
            {
                debug!(session_id = %session.id, "Rejected without veto; looping to refinement");
                self.transition_locked(session, SessionPhase::Refinement).await?;
            }
            Some(outcome) => {
                let decision = self
                    .record_decision(session.id, outcome, &result.summary)
                    .await?;
                let gated = outcome == DecisionOutcome::Escalated
                    || self.config.deliberation.require_human_approval;
                if gated {
                    self.transition_locked(session, SessionPhase::Review).await?;
                    self.bus.publish(CouncilEvent::DecisionPendingReview { decision });
                } else {
                    self.transition_locked(session, SessionPhase::Decided).await?;
                    info!(session_id = %session.id, outcome = outcome.as_str(), "Decision recorded");
                    self.bus.publish(CouncilEvent::DecisionRecorded { decision });
                }
            }
        }

        Ok(result)
    }

    /// Create the session's decision, or overwrite the one it already has
    pub(super) async fn record_decision(
        &self,
        session_id: Uuid,
        outcome: DecisionOutcome,
        summary: &str,
    ) -> Result<Decision> {
        match self.store.get_decision(session_id).await? {
            Some(mut decision) => {
                decision.outcome = outcome;
                decision.summary = summary.to_string();
                decision.updated_at = Utc::now();
                self.store.update_decision(&decision).await?;
                Ok(decision)
            }
            None => {
                let decision = Decision::new(session_id, outcome, summary);
                self.store.save_decision(&decision).await?;
                Ok(decision)
            }
        }
    }

    /// Human gate: approve or reject finalizes, send_back reopens discussion
    pub async fn submit_review(
        &self,
        session_id: Uuid,
        action: ReviewAction,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<Decision> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.store.get_session(session_id).await?;
        if session.phase != SessionPhase::Review {
            return Err(AppError::WrongPhase {
                operation: "review",
                phase: session.phase,
            });
        }

        let mut decision = self
            .store
            .get_decision(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Decision for session {}", session_id)))?;
        decision.reviewer = Some(reviewer.to_string());
        decision.review_notes = notes.map(str::to_string);
        decision.updated_at = Utc::now();

        match action {
            ReviewAction::Approve | ReviewAction::Reject => {
                decision.outcome = if action == ReviewAction::Approve {
                    DecisionOutcome::Approved
                } else {
                    DecisionOutcome::Rejected
                };
                self.store.update_decision(&decision).await?;
                self.transition_locked(&mut session, SessionPhase::Decided).await?;
                info!(
                    session_id = %session_id,
                    outcome = decision.outcome.as_str(),
                    reviewer,
                    "Decision recorded after review"
                );
                self.bus.publish(CouncilEvent::DecisionRecorded {
                    decision: decision.clone(),
                });
            }
            ReviewAction::SendBack => {
                self.store.update_decision(&decision).await?;
                self.transition_locked(&mut session, SessionPhase::Discussion).await?;
                info!(session_id = %session_id, reviewer, "Session sent back to discussion");
            }
        }

        Ok(decision)
    }
}
