//! Persistence port
//!
//! Each call is independently durable; nothing here spans a transaction.
//! The orchestrator serializes per-session writes itself.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AmendmentStatus, Decision, EscalationEvent, InboundEvent, Message, Session, Vote};

#[async_trait]
pub trait CouncilStore: Send + Sync {
    async fn save_session(&self, session: &Session) -> Result<()>;
    async fn update_session(&self, session: &Session) -> Result<()>;
    async fn get_session(&self, id: Uuid) -> Result<Session>;
    /// Newest first
    async fn list_sessions(&self, council_id: &str) -> Result<Vec<Session>>;

    async fn save_message(&self, message: &Message) -> Result<()>;
    async fn get_message(&self, id: Uuid) -> Result<Message>;
    /// Oldest first, in insertion order
    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>>;
    async fn update_amendment_status(&self, id: Uuid, status: AmendmentStatus) -> Result<()>;

    /// Fails with `DuplicateVote` when the agent already voted in the round
    async fn save_vote(&self, vote: &Vote) -> Result<()>;
    async fn list_votes(&self, session_id: Uuid) -> Result<Vec<Vote>>;

    async fn save_decision(&self, decision: &Decision) -> Result<()>;
    async fn update_decision(&self, decision: &Decision) -> Result<()>;
    async fn get_decision(&self, session_id: Uuid) -> Result<Option<Decision>>;

    async fn save_escalation_event(&self, event: &EscalationEvent) -> Result<()>;
    async fn list_escalation_events(&self, session_id: Uuid) -> Result<Vec<EscalationEvent>>;

    async fn save_inbound_event(&self, event: &InboundEvent) -> Result<()>;
    async fn get_inbound_event(&self, id: Uuid) -> Result<InboundEvent>;
}
