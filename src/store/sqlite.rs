use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::CouncilStore;
use crate::error::{AppError, Result};
use crate::models::{
    AmendmentStatus, Decision, EscalationEvent, InboundEvent, Message, Session, Vote,
};

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))
    }
}

fn to_json(values: &[String]) -> Result<String> {
    serde_json::to_string(values).map_err(|e| AppError::Internal(format!("Encode failed: {}", e)))
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::Internal(format!("Invalid {} UUID: {}", field, e)))
}

fn parse_opt_uuid(value: Option<String>, field: &str) -> Result<Option<Uuid>> {
    value.map(|v| parse_uuid(&v, field)).transpose()
}

fn parse_round(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| AppError::Internal(format!("Invalid {}: {}", field, value)))
}

#[async_trait]
impl CouncilStore for SqliteStore {
    // Session operations

    async fn save_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, council_id, title, phase, lead_agent_id, trigger_event_id,
                active_proposal_id, round, voting_round, topics, participants, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(&session.council_id)
        .bind(&session.title)
        .bind(session.phase.as_str())
        .bind(&session.lead_agent_id)
        .bind(session.trigger_event_id.map(|u| u.to_string()))
        .bind(session.active_proposal_id.map(|u| u.to_string()))
        .bind(i64::from(session.round))
        .bind(i64::from(session.voting_round))
        .bind(to_json(&session.topics)?)
        .bind(to_json(&session.participants)?)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET title = ?, phase = ?, lead_agent_id = ?, active_proposal_id = ?, round = ?,
                voting_round = ?, topics = ?, participants = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&session.title)
        .bind(session.phase.as_str())
        .bind(&session.lead_agent_id)
        .bind(session.active_proposal_id.map(|u| u.to_string()))
        .bind(i64::from(session.round))
        .bind(i64::from(session.voting_round))
        .bind(to_json(&session.topics)?)
        .bind(to_json(&session.participants)?)
        .bind(session.updated_at)
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Session {} not found", session.id)));
        }
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Session> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, council_id, title, phase, lead_agent_id, trigger_event_id, active_proposal_id,
                round, voting_round, topics, participants, created_at, updated_at
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;

        row.try_into()
    }

    async fn list_sessions(&self, council_id: &str) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, council_id, title, phase, lead_agent_id, trigger_event_id, active_proposal_id,
                round, voting_round, topics, participants, created_at, updated_at
            FROM sessions
            WHERE council_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(council_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Message operations

    async fn save_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, session_id, from_agent_id, to_agent_id, body, message_type,
                parent_id, amendment_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id.to_string())
        .bind(message.session_id.to_string())
        .bind(&message.from_agent_id)
        .bind(&message.to_agent_id)
        .bind(&message.body)
        .bind(message.message_type.as_str())
        .bind(message.parent_id.map(|u| u.to_string()))
        .bind(message.amendment_status.map(|s| s.as_str()))
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> Result<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, from_agent_id, to_agent_id, body, message_type, parent_id,
                amendment_status, created_at
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Message {} not found", id)))?;

        row.try_into()
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, from_agent_id, to_agent_id, body, message_type, parent_id,
                amendment_status, created_at
            FROM messages
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn update_amendment_status(&self, id: Uuid, status: AmendmentStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET amendment_status = ?
            WHERE id = ? AND message_type = 'amendment'
            "#,
        )
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Amendment {} not found", id)));
        }
        Ok(())
    }

    // Vote operations

    async fn save_vote(&self, vote: &Vote) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO votes (id, session_id, agent_id, value, reasoning, voting_round, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(vote.id.to_string())
        .bind(vote.session_id.to_string())
        .bind(&vote.agent_id)
        .bind(vote.value.as_str())
        .bind(&vote.reasoning)
        .bind(i64::from(vote.voting_round))
        .bind(vote.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::DuplicateVote {
                agent_id: vote.agent_id.clone(),
                round: vote.voting_round,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_votes(&self, session_id: Uuid) -> Result<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(
            r#"
            SELECT id, session_id, agent_id, value, reasoning, voting_round, created_at
            FROM votes
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Decision operations

    async fn save_decision(&self, decision: &Decision) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO decisions (id, session_id, outcome, summary, reviewer, review_notes,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(decision.id.to_string())
        .bind(decision.session_id.to_string())
        .bind(decision.outcome.as_str())
        .bind(&decision.summary)
        .bind(&decision.reviewer)
        .bind(&decision.review_notes)
        .bind(decision.created_at)
        .bind(decision.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_decision(&self, decision: &Decision) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE decisions
            SET outcome = ?, summary = ?, reviewer = ?, review_notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(decision.outcome.as_str())
        .bind(&decision.summary)
        .bind(&decision.reviewer)
        .bind(&decision.review_notes)
        .bind(decision.updated_at)
        .bind(decision.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Decision {} not found", decision.id)));
        }
        Ok(())
    }

    async fn get_decision(&self, session_id: Uuid) -> Result<Option<Decision>> {
        let row = sqlx::query_as::<_, DecisionRow>(
            r#"
            SELECT id, session_id, outcome, summary, reviewer, review_notes, created_at, updated_at
            FROM decisions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    // Escalation audit

    async fn save_escalation_event(&self, event: &EscalationEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO escalation_events (id, session_id, rule_name, trigger_type, action_type,
                detail, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.session_id.to_string())
        .bind(&event.rule_name)
        .bind(event.trigger.as_str())
        .bind(event.action.as_str())
        .bind(&event.detail)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_escalation_events(&self, session_id: Uuid) -> Result<Vec<EscalationEvent>> {
        let rows = sqlx::query_as::<_, EscalationRow>(
            r#"
            SELECT id, session_id, rule_name, trigger_type, action_type, detail, created_at
            FROM escalation_events
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Inbound events

    async fn save_inbound_event(&self, event: &InboundEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inbound_events (id, source, event_type, payload, received_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(&event.source)
        .bind(&event.event_type)
        .bind(event.payload.to_string())
        .bind(event.received_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_inbound_event(&self, id: Uuid) -> Result<InboundEvent> {
        let row = sqlx::query_as::<_, InboundRow>(
            r#"
            SELECT id, source, event_type, payload, received_at
            FROM inbound_events
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Inbound event {} not found", id)))?;

        row.try_into()
    }
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    council_id: String,
    title: String,
    phase: String,
    lead_agent_id: Option<String>,
    trigger_event_id: Option<String>,
    active_proposal_id: Option<String>,
    round: i64,
    voting_round: i64,
    topics: String,
    participants: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(Session {
            id: parse_uuid(&row.id, "session")?,
            council_id: row.council_id,
            title: row.title,
            phase: row
                .phase
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid phase: {}", e)))?,
            lead_agent_id: row.lead_agent_id,
            trigger_event_id: parse_opt_uuid(row.trigger_event_id, "trigger_event_id")?,
            active_proposal_id: parse_opt_uuid(row.active_proposal_id, "active_proposal_id")?,
            round: parse_round(row.round, "round")?,
            voting_round: parse_round(row.voting_round, "voting_round")?,
            topics: serde_json::from_str(&row.topics)
                .map_err(|e| AppError::Internal(format!("Invalid topics: {}", e)))?,
            participants: serde_json::from_str(&row.participants)
                .map_err(|e| AppError::Internal(format!("Invalid participants: {}", e)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    session_id: String,
    from_agent_id: String,
    to_agent_id: Option<String>,
    body: String,
    message_type: String,
    parent_id: Option<String>,
    amendment_status: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self> {
        let amendment_status = row
            .amendment_status
            .map(|s| s.parse::<AmendmentStatus>())
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid amendment status: {}", e)))?;

        Ok(Message {
            id: parse_uuid(&row.id, "message")?,
            session_id: parse_uuid(&row.session_id, "session")?,
            from_agent_id: row.from_agent_id,
            to_agent_id: row.to_agent_id,
            body: row.body,
            message_type: row
                .message_type
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid message type: {}", e)))?,
            parent_id: parse_opt_uuid(row.parent_id, "parent_id")?,
            amendment_status,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VoteRow {
    id: String,
    session_id: String,
    agent_id: String,
    value: String,
    reasoning: String,
    voting_round: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<VoteRow> for Vote {
    type Error = AppError;

    fn try_from(row: VoteRow) -> Result<Self> {
        Ok(Vote {
            id: parse_uuid(&row.id, "vote")?,
            session_id: parse_uuid(&row.session_id, "session")?,
            agent_id: row.agent_id,
            value: row
                .value
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid vote value: {}", e)))?,
            reasoning: row.reasoning,
            voting_round: parse_round(row.voting_round, "voting_round")?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: String,
    session_id: String,
    outcome: String,
    summary: String,
    reviewer: Option<String>,
    review_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DecisionRow> for Decision {
    type Error = AppError;

    fn try_from(row: DecisionRow) -> Result<Self> {
        Ok(Decision {
            id: parse_uuid(&row.id, "decision")?,
            session_id: parse_uuid(&row.session_id, "session")?,
            outcome: row
                .outcome
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid outcome: {}", e)))?,
            summary: row.summary,
            reviewer: row.reviewer,
            review_notes: row.review_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EscalationRow {
    id: String,
    session_id: String,
    rule_name: String,
    trigger_type: String,
    action_type: String,
    detail: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<EscalationRow> for EscalationEvent {
    type Error = AppError;

    fn try_from(row: EscalationRow) -> Result<Self> {
        Ok(EscalationEvent {
            id: parse_uuid(&row.id, "escalation")?,
            session_id: parse_uuid(&row.session_id, "session")?,
            rule_name: row.rule_name,
            trigger: row
                .trigger_type
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid trigger: {}", e)))?,
            action: row
                .action_type
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid action: {}", e)))?,
            detail: row.detail,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InboundRow {
    id: String,
    source: String,
    event_type: String,
    payload: String,
    received_at: DateTime<Utc>,
}

impl TryFrom<InboundRow> for InboundEvent {
    type Error = AppError;

    fn try_from(row: InboundRow) -> Result<Self> {
        Ok(InboundEvent {
            id: parse_uuid(&row.id, "inbound event")?,
            source: row.source,
            event_type: row.event_type,
            payload: serde_json::from_str(&row.payload)
                .map_err(|e| AppError::Internal(format!("Invalid payload: {}", e)))?,
            received_at: row.received_at,
        })
    }
}
