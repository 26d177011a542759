//! Data models for sessions, messages, votes and decisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of a deliberation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Investigation,
    Proposal,
    Discussion,
    Refinement,
    Voting,
    Review,
    Decided,
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Investigation => "investigation",
            SessionPhase::Proposal => "proposal",
            SessionPhase::Discussion => "discussion",
            SessionPhase::Refinement => "refinement",
            SessionPhase::Voting => "voting",
            SessionPhase::Review => "review",
            SessionPhase::Decided => "decided",
            SessionPhase::Closed => "closed",
        }
    }

    /// Terminal phases end the session's escalation bookkeeping
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Decided | SessionPhase::Closed)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "investigation" => Ok(SessionPhase::Investigation),
            "proposal" => Ok(SessionPhase::Proposal),
            "discussion" => Ok(SessionPhase::Discussion),
            "refinement" => Ok(SessionPhase::Refinement),
            "voting" => Ok(SessionPhase::Voting),
            "review" => Ok(SessionPhase::Review),
            "decided" => Ok(SessionPhase::Decided),
            "closed" => Ok(SessionPhase::Closed),
            _ => Err(format!("Invalid session phase: {}", s)),
        }
    }
}

/// One deliberation instance within a council
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub council_id: String,
    pub title: String,
    pub phase: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_event_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_proposal_id: Option<Uuid>,
    /// Incremented on every entry into discussion
    pub round: u32,
    /// Incremented on every entry into voting; ballots are keyed by it
    pub voting_round: u32,
    /// Topic tags used for dynamic vote weighting
    pub topics: Vec<String>,
    /// Agents explicitly assigned to the session (lead first)
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(council_id: impl Into<String>, title: impl Into<String>, phase: SessionPhase) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            council_id: council_id.into(),
            title: title.into(),
            phase,
            lead_agent_id: None,
            trigger_event_id: None,
            active_proposal_id: None,
            round: 0,
            voting_round: 0,
            topics: Vec::new(),
            participants: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, agent_id: &str) -> bool {
        self.participants.iter().any(|p| p == agent_id)
    }

    pub fn is_lead(&self, agent_id: &str) -> bool {
        self.lead_agent_id.as_deref() == Some(agent_id)
    }

    /// Add a participant, keeping insertion order and no duplicates
    pub fn add_participant(&mut self, agent_id: &str) -> bool {
        if self.is_participant(agent_id) {
            return false;
        }
        self.participants.push(agent_id.to_string());
        true
    }
}

/// Kind of message within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Discussion,
    Consultation,
    Finding,
    Proposal,
    Amendment,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Discussion => "discussion",
            MessageType::Consultation => "consultation",
            MessageType::Finding => "finding",
            MessageType::Proposal => "proposal",
            MessageType::Amendment => "amendment",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discussion" => Ok(MessageType::Discussion),
            "consultation" => Ok(MessageType::Consultation),
            "finding" => Ok(MessageType::Finding),
            "proposal" => Ok(MessageType::Proposal),
            "amendment" => Ok(MessageType::Amendment),
            _ => Err(format!("Invalid message type: {}", s)),
        }
    }
}

/// Resolution status of an amendment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentStatus {
    Proposed,
    Accepted,
    Rejected,
}

impl AmendmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmendmentStatus::Proposed => "proposed",
            AmendmentStatus::Accepted => "accepted",
            AmendmentStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for AmendmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(AmendmentStatus::Proposed),
            "accepted" => Ok(AmendmentStatus::Accepted),
            "rejected" => Ok(AmendmentStatus::Rejected),
            _ => Err(format!("Invalid amendment status: {}", s)),
        }
    }
}

/// An utterance within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub from_agent_id: String,
    /// None means broadcast
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_agent_id: Option<String>,
    pub body: String,
    pub message_type: MessageType,
    /// Amendments link to the proposal they amend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amendment_status: Option<AmendmentStatus>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        session_id: Uuid,
        from_agent_id: impl Into<String>,
        message_type: MessageType,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            from_agent_id: from_agent_id.into(),
            to_agent_id: None,
            body: body.into(),
            message_type,
            parent_id: None,
            amendment_status: None,
            created_at: Utc::now(),
        }
    }

    pub fn to(mut self, agent_id: Option<String>) -> Self {
        self.to_agent_id = agent_id;
        self
    }

    pub fn amending(mut self, proposal_id: Uuid) -> Self {
        self.parent_id = Some(proposal_id);
        self.amendment_status = Some(AmendmentStatus::Proposed);
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.to_agent_id.is_none()
    }
}

/// Value carried by a ballot; the valid subset depends on the voting scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    Approve,
    Reject,
    Abstain,
    Consent,
    Object,
}

impl VoteValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteValue::Approve => "approve",
            VoteValue::Reject => "reject",
            VoteValue::Abstain => "abstain",
            VoteValue::Consent => "consent",
            VoteValue::Object => "object",
        }
    }
}

impl std::str::FromStr for VoteValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(VoteValue::Approve),
            "reject" => Ok(VoteValue::Reject),
            "abstain" => Ok(VoteValue::Abstain),
            "consent" => Ok(VoteValue::Consent),
            "object" => Ok(VoteValue::Object),
            _ => Err(format!("Invalid vote value: {}", s)),
        }
    }
}

/// A ballot cast by one agent in one voting round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub session_id: Uuid,
    pub agent_id: String,
    pub value: VoteValue,
    pub reasoning: String,
    pub voting_round: u32,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(
        session_id: Uuid,
        agent_id: impl Into<String>,
        value: VoteValue,
        reasoning: impl Into<String>,
        voting_round: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            agent_id: agent_id.into(),
            value,
            reasoning: reasoning.into(),
            voting_round,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
    Escalated,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Approved => "approved",
            DecisionOutcome::Rejected => "rejected",
            DecisionOutcome::Escalated => "escalated",
        }
    }
}

impl std::str::FromStr for DecisionOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(DecisionOutcome::Approved),
            "rejected" => Ok(DecisionOutcome::Rejected),
            "escalated" => Ok(DecisionOutcome::Escalated),
            _ => Err(format!("Invalid decision outcome: {}", s)),
        }
    }
}

/// Terminal record of a session's deliberation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub session_id: Uuid,
    pub outcome: DecisionOutcome,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(session_id: Uuid, outcome: DecisionOutcome, summary: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id,
            outcome,
            summary: summary.into(),
            reviewer: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Conditions that can fire an escalation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Timeout,
    Deadlock,
    QuorumNotMet,
    VetoExercised,
    MaxRoundsExceeded,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Timeout => "timeout",
            TriggerType::Deadlock => "deadlock",
            TriggerType::QuorumNotMet => "quorum_not_met",
            TriggerType::VetoExercised => "veto_exercised",
            TriggerType::MaxRoundsExceeded => "max_rounds_exceeded",
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(TriggerType::Timeout),
            "deadlock" => Ok(TriggerType::Deadlock),
            "quorum_not_met" => Ok(TriggerType::QuorumNotMet),
            "veto_exercised" => Ok(TriggerType::VetoExercised),
            "max_rounds_exceeded" => Ok(TriggerType::MaxRoundsExceeded),
            _ => Err(format!("Invalid trigger type: {}", s)),
        }
    }
}

/// Bounded actions an escalation rule can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    EscalateToHuman,
    RestartDiscussion,
    AddAgent,
    AutoDecide,
    NotifyExternal,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::EscalateToHuman => "escalate_to_human",
            ActionType::RestartDiscussion => "restart_discussion",
            ActionType::AddAgent => "add_agent",
            ActionType::AutoDecide => "auto_decide",
            ActionType::NotifyExternal => "notify_external",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "escalate_to_human" => Ok(ActionType::EscalateToHuman),
            "restart_discussion" => Ok(ActionType::RestartDiscussion),
            "add_agent" => Ok(ActionType::AddAgent),
            "auto_decide" => Ok(ActionType::AutoDecide),
            "notify_external" => Ok(ActionType::NotifyExternal),
            _ => Err(format!("Invalid action type: {}", s)),
        }
    }
}

/// Append-only audit record of a fired escalation rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub rule_name: String,
    pub trigger: TriggerType,
    pub action: ActionType,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl EscalationEvent {
    pub fn new(
        session_id: Uuid,
        rule_name: impl Into<String>,
        trigger: TriggerType,
        action: ActionType,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            rule_name: rule_name.into(),
            trigger,
            action,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }
}

/// Normalized external event (e.g. an issue tracker webhook)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            event_type: event_type.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    /// Labels found at `labels`, `issue.labels` or `pull_request.labels`.
    ///
    /// Entries may be plain strings or objects with a `name` field.
    pub fn labels(&self) -> Vec<String> {
        let candidates = [
            self.payload.get("labels"),
            self.payload.get("issue").and_then(|i| i.get("labels")),
            self.payload.get("pull_request").and_then(|p| p.get("labels")),
        ];

        candidates
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_array())
            .flatten()
            .filter_map(|label| {
                label
                    .as_str()
                    .or_else(|| label.get("name").and_then(|n| n.as_str()))
                    .map(str::to_string)
            })
            .collect()
    }

    /// Best-effort human title for a session opened by this event
    pub fn title(&self) -> String {
        let title = self
            .payload
            .get("title")
            .or_else(|| self.payload.get("issue").and_then(|i| i.get("title")))
            .or_else(|| self.payload.get("pull_request").and_then(|p| p.get("title")))
            .and_then(|t| t.as_str());

        match title {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => format!("{}:{}", self.source, self.event_type),
        }
    }
}

/// Human review action on a session in review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    SendBack,
}

impl std::str::FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ReviewAction::Approve),
            "reject" => Ok(ReviewAction::Reject),
            "send_back" => Ok(ReviewAction::SendBack),
            _ => Err(format!("Invalid review action: {}", s)),
        }
    }
}

/// Request to start a session manually
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSession {
    pub title: String,
    pub lead: Option<String>,
    #[serde(default)]
    pub consult: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Overrides the configured initial phase
    pub phase: Option<SessionPhase>,
    pub trigger_event_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_round_trip_strings() {
        for phase in [
            SessionPhase::Investigation,
            SessionPhase::Review,
            SessionPhase::Closed,
        ] {
            assert_eq!(phase.as_str().parse::<SessionPhase>().unwrap(), phase);
        }
        assert!("limbo".parse::<SessionPhase>().is_err());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(SessionPhase::Decided.is_terminal());
        assert!(SessionPhase::Closed.is_terminal());
        assert!(!SessionPhase::Review.is_terminal());
    }

    #[test]
    fn test_session_participants_are_unique() {
        let mut session = Session::new("core", "t", SessionPhase::Proposal);
        assert!(session.add_participant("arch"));
        assert!(!session.add_participant("arch"));
        assert!(session.add_participant("sec"));
        assert_eq!(session.participants, vec!["arch", "sec"]);
    }

    #[test]
    fn test_inbound_labels_from_issue_payload() {
        let event = InboundEvent::new(
            "github",
            "issues",
            json!({
                "action": "opened",
                "issue": {
                    "title": "Rotate signing keys",
                    "labels": [{"name": "security"}, {"name": "infra"}]
                }
            }),
        );
        assert_eq!(event.labels(), vec!["security", "infra"]);
        assert_eq!(event.title(), "Rotate signing keys");
    }

    #[test]
    fn test_inbound_title_fallback() {
        let event = InboundEvent::new("cron", "tick", json!({ "labels": ["ops"] }));
        assert_eq!(event.title(), "cron:tick");
        assert_eq!(event.labels(), vec!["ops"]);
    }

    #[test]
    fn test_amending_sets_status() {
        let proposal = Uuid::new_v4();
        let msg = Message::new(Uuid::new_v4(), "a", MessageType::Amendment, "tweak")
            .amending(proposal);
        assert_eq!(msg.parent_id, Some(proposal));
        assert_eq!(msg.amendment_status, Some(AmendmentStatus::Proposed));
        assert!(msg.is_broadcast());
    }
}
