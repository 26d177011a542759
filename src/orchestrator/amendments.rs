use tracing::{debug, info};
use uuid::Uuid;

use super::Orchestrator;
use crate::error::{AppError, Result};
use crate::events::CouncilEvent;
use crate::models::{AmendmentStatus, Message, MessageType, Session, SessionPhase};

impl Orchestrator {
    /// Propose a change to the active proposal while refining
    pub async fn propose_amendment(&self, session_id: Uuid, agent_id: &str, body: &str) -> Result<Message> {
        let _guard = self.lock_session(session_id).await;
        let session = self.store.get_session(session_id).await?;
        let proposal_id = self.refining_proposal(&session, "propose amendments")?;
        self.registry.require(agent_id).await?;

        let existing = self
            .store
            .list_messages(session_id)
            .await?
            .iter()
            .filter(|m| m.message_type == MessageType::Amendment)
            .count();
        if existing >= self.config.refinement.max_amendments {
            return Err(AppError::LimitExceeded(format!(
                "Session {} already has {} amendments",
                session_id, existing
            )));
        }

        let mut message =
            Message::new(session_id, agent_id, MessageType::Amendment, body).amending(proposal_id);
        let auto_accept = self.config.refinement.auto_accept;
        if auto_accept {
            message.amendment_status = Some(AmendmentStatus::Accepted);
        }
        let message = self.post(&session, message).await?;

        if auto_accept {
            self.bus.publish(CouncilEvent::AmendmentResolved {
                session_id,
                amendment_id: message.id,
                status: AmendmentStatus::Accepted,
                resolved_by: "auto_accept".to_string(),
            });
        }
        Ok(message)
    }

    /// Accept or reject a proposed amendment. Needs the lead or proposal rights.
    pub async fn resolve_amendment(
        &self,
        session_id: Uuid,
        amendment_id: Uuid,
        resolver_id: &str,
        accept: bool,
    ) -> Result<Message> {
        let _guard = self.lock_session(session_id).await;
        let session = self.store.get_session(session_id).await?;
        self.refining_proposal(&session, "resolve amendments")?;

        let resolver = self.registry.require(resolver_id).await?;
        if !resolver.can_propose && !session.is_lead(resolver_id) {
            return Err(AppError::Forbidden(format!(
                "Agent {} may not resolve amendments",
                resolver_id
            )));
        }

        let mut amendment = self.store.get_message(amendment_id).await?;
        if amendment.session_id != session_id || amendment.message_type != MessageType::Amendment {
            return Err(AppError::NotFound(format!(
                "Amendment {} not found in session {}",
                amendment_id, session_id
            )));
        }
        if amendment.amendment_status != Some(AmendmentStatus::Proposed) {
            return Err(AppError::BadRequest(format!(
                "Amendment {} is already resolved",
                amendment_id
            )));
        }

        let status = if accept {
            AmendmentStatus::Accepted
        } else {
            AmendmentStatus::Rejected
        };
        self.store.update_amendment_status(amendment_id, status).await?;
        amendment.amendment_status = Some(status);

        info!(
            session_id = %session_id,
            amendment_id = %amendment_id,
            status = status.as_str(),
            resolver_id,
            "Amendment resolved"
        );
        self.bus.publish(CouncilEvent::AmendmentResolved {
            session_id,
            amendment_id,
            status,
            resolved_by: resolver_id.to_string(),
        });
        Ok(amendment)
    }

    fn refining_proposal(&self, session: &Session, operation: &'static str) -> Result<Uuid> {
        if session.phase != SessionPhase::Refinement {
            return Err(AppError::WrongPhase {
                operation,
                phase: session.phase,
            });
        }
        session
            .active_proposal_id
            .ok_or_else(|| AppError::BadRequest(format!("Session {} has no active proposal", session.id)))
    }

    /// Fold accepted amendments into a new, unsaved proposal.
    ///
    /// Rejected and unresolved amendments are dropped. Returns `None` when
    /// none were accepted.
    pub(super) async fn merged_proposal(&self, session: &Session) -> Result<Option<Message>> {
        let Some(proposal_id) = session.active_proposal_id else {
            return Ok(None);
        };

        let messages = self.store.list_messages(session.id).await?;
        let accepted: Vec<&Message> = messages
            .iter()
            .filter(|m| {
                m.message_type == MessageType::Amendment
                    && m.parent_id == Some(proposal_id)
                    && m.amendment_status == Some(AmendmentStatus::Accepted)
            })
            .collect();
        if accepted.is_empty() {
            return Ok(None);
        }

        let original = messages
            .iter()
            .find(|m| m.id == proposal_id)
            .ok_or_else(|| AppError::NotFound(format!("Proposal {} not found", proposal_id)))?;

        let mut body = original.body.clone();
        for amendment in &accepted {
            body.push_str(&format!(
                "\n\nAmendment from {}:\n{}",
                amendment.from_agent_id, amendment.body
            ));
        }

        let mut merged = Message::new(session.id, original.from_agent_id.clone(), MessageType::Proposal, body);
        merged.parent_id = Some(proposal_id);
        debug!(
            session_id = %session.id,
            proposal_id = %merged.id,
            merged = accepted.len(),
            "Merging accepted amendments"
        );
        Ok(Some(merged))
    }
}
