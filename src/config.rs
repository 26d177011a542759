//! Council configuration
//!
//! Loaded from a TOML document and validated once before the engine starts.
//! Everything downstream treats the resulting [`CouncilConfig`] as read-only.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{ActionType, DecisionOutcome, SessionPhase, TriggerType};
use crate::router::{Edge, EventRoute, PolicyKind};
use crate::voting::{DynamicWeights, Scheme, SchemeName, ThresholdPreset};

/// Root configuration for one council
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    pub council: CouncilInfo,
    #[serde(default)]
    pub deliberation: DeliberationConfig,
    #[serde(default)]
    pub refinement: RefinementConfig,
    #[serde(default)]
    pub voting: VotingConfig,
    #[serde(default)]
    pub communication: CommunicationConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub rules: Vec<EscalationRule>,
    #[serde(default)]
    pub event_routing: Vec<EventRoute>,
    #[serde(default)]
    pub spawner: SpawnerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationConfig {
    #[serde(default = "default_initial_phase")]
    pub initial_phase: SessionPhase,
    /// Entering discussion with a round counter above this fires `max_rounds_exceeded`
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Route concluded votes through human review before `decided`
    #[serde(default = "default_true")]
    pub require_human_approval: bool,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            initial_phase: default_initial_phase(),
            max_rounds: default_max_rounds(),
            require_human_approval: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_amendments")]
    pub max_amendments: usize,
    #[serde(default)]
    pub auto_accept: bool,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_amendments: default_max_amendments(),
            auto_accept: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    #[serde(default)]
    pub scheme: SchemeName,
    /// Minimum ballot count before any outcome may be declared
    #[serde(default = "default_quorum")]
    pub quorum: usize,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub preset: Option<ThresholdPreset>,
    #[serde(default)]
    pub dynamic_weights: DynamicWeights,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            scheme: SchemeName::default(),
            quorum: default_quorum(),
            threshold: None,
            preset: None,
            dynamic_weights: DynamicWeights::default(),
        }
    }
}

impl VotingConfig {
    /// Resolve the configured scheme into its tallying strategy
    pub fn scheme(&self) -> Scheme {
        Scheme::resolve(self.scheme, self.threshold, self.preset)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunicationConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Static description of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub can_propose: bool,
    #[serde(default)]
    pub can_veto: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Long-lived identity with a stable token, assignable to many sessions
    #[serde(default)]
    pub persistent: bool,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            role: String::new(),
            expertise: Vec::new(),
            can_propose: false,
            can_veto: false,
            weight: default_weight(),
            persistent: false,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Trigger half of an escalation rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub kind: TriggerType,
    /// When set, the rule only applies in these phases
    #[serde(default)]
    pub phases: Option<Vec<SessionPhase>>,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

/// Action half of an escalation rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default)]
    pub message: Option<String>,
    /// Agent to spawn for `add_agent`
    #[serde(default)]
    pub agent: Option<String>,
    /// Outcome for `auto_decide`; defaults to rejected
    #[serde(default)]
    pub outcome: Option<DecisionOutcome>,
    /// Webhook for `notify_external`
    #[serde(default)]
    pub url: Option<String>,
    /// JSON object merged under the `notify_external` payload
    #[serde(default)]
    pub template: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    /// Stable identity; fire counts are keyed by it
    pub name: String,
    /// Lower fires first
    #[serde(default = "default_priority")]
    pub priority: u32,
    pub trigger: TriggerConfig,
    pub action: ActionConfig,
    #[serde(default)]
    pub stop_after: bool,
    #[serde(default = "default_max_fires")]
    pub max_fires_per_session: u32,
}

impl EscalationRule {
    pub fn applies_in(&self, phase: SessionPhase) -> bool {
        match &self.trigger.phases {
            Some(phases) => phases.contains(&phase),
            None => true,
        }
    }

    /// None for missing, non-positive or unrepresentable values
    pub fn timeout(&self) -> Option<Duration> {
        self.trigger
            .timeout_secs
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnerConfig {
    /// Launcher endpoint; when absent spawns are only logged
    #[serde(default)]
    pub launch_url: Option<String>,
    /// Address agents call back on
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            launch_url: None,
            callback_url: default_callback_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Capacity of the notification channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database_url: default_database_url(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_initial_phase() -> SessionPhase {
    SessionPhase::Proposal
}

fn default_max_rounds() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_amendments() -> usize {
    10
}

fn default_quorum() -> usize {
    1
}

fn default_weight() -> f64 {
    1.0
}

fn default_priority() -> u32 {
    100
}

fn default_max_fires() -> u32 {
    1
}

/// Longest timeout a rule may arm, thirty days
pub const MAX_TIMEOUT_SECS: f64 = 30.0 * 24.0 * 60.0 * 60.0;

fn default_callback_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_url() -> String {
    "sqlite:council.db?mode=rwc".to_string()
}

fn default_event_buffer() -> usize {
    256
}

impl CouncilConfig {
    /// Minimal config with no agents or rules
    pub fn new(council_id: impl Into<String>) -> Self {
        let id = council_id.into();
        Self {
            council: CouncilInfo {
                name: id.clone(),
                id,
            },
            deliberation: DeliberationConfig::default(),
            refinement: RefinementConfig::default(),
            voting: VotingConfig::default(),
            communication: CommunicationConfig::default(),
            agents: Vec::new(),
            rules: Vec::new(),
            event_routing: Vec::new(),
            spawner: SpawnerConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CouncilConfig =
            toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn agent(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    /// Reject configurations the engine cannot run safely
    pub fn validate(&self) -> Result<()> {
        if self.council.id.trim().is_empty() {
            return Err(AppError::Config("council.id must not be empty".to_string()));
        }

        let mut ids = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(AppError::Config("agent id must not be empty".to_string()));
            }
            if !ids.insert(agent.id.as_str()) {
                return Err(AppError::Config(format!("duplicate agent id: {}", agent.id)));
            }
            if !(agent.weight.is_finite() && agent.weight > 0.0) {
                return Err(AppError::Config(format!(
                    "agent {} has non-positive weight {}",
                    agent.id, agent.weight
                )));
            }
        }
        let known = |id: &str| ids.contains(id);

        if self.voting.quorum == 0 {
            return Err(AppError::Config("voting.quorum must be at least 1".to_string()));
        }
        if let Some(threshold) = self.voting.threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(AppError::Config(format!(
                    "voting.threshold {} outside (0, 1]",
                    threshold
                )));
            }
        }
        let weights = &self.voting.dynamic_weights;
        if weights.bonus_per_match < 0.0 || weights.max_multiplier < 1.0 {
            return Err(AppError::Config(
                "dynamic_weights needs bonus_per_match >= 0 and max_multiplier >= 1".to_string(),
            ));
        }

        if self.deliberation.initial_phase.is_terminal() {
            return Err(AppError::Config(format!(
                "initial_phase cannot be terminal ({})",
                self.deliberation.initial_phase
            )));
        }

        for edge in &self.communication.edges {
            for end in [&edge.from, &edge.to] {
                if !known(end) {
                    return Err(AppError::Config(format!(
                        "communication edge references unknown agent: {}",
                        end
                    )));
                }
            }
        }

        let mut rule_names = HashSet::new();
        for rule in &self.rules {
            if !rule_names.insert(rule.name.as_str()) {
                return Err(AppError::Config(format!("duplicate rule name: {}", rule.name)));
            }
            if let Some(secs) = rule.trigger.timeout_secs {
                if secs > MAX_TIMEOUT_SECS {
                    return Err(AppError::Config(format!(
                        "rule {} timeout_secs {} exceeds the {} second limit",
                        rule.name, secs, MAX_TIMEOUT_SECS
                    )));
                }
            }
            if rule.trigger.kind == TriggerType::Timeout && rule.timeout().is_none() {
                return Err(AppError::Config(format!(
                    "rule {} has a timeout trigger without a positive timeout_secs",
                    rule.name
                )));
            }
            match rule.action.kind {
                ActionType::AddAgent => match rule.action.agent.as_deref() {
                    Some(agent) if known(agent) => {}
                    Some(agent) => {
                        return Err(AppError::Config(format!(
                            "rule {} references unknown agent: {}",
                            rule.name, agent
                        )))
                    }
                    None => {
                        return Err(AppError::Config(format!(
                            "rule {} uses add_agent without an agent",
                            rule.name
                        )))
                    }
                },
                ActionType::NotifyExternal if rule.action.url.is_none() => {
                    return Err(AppError::Config(format!(
                        "rule {} uses notify_external without a url",
                        rule.name
                    )))
                }
                _ => {}
            }
        }

        for route in &self.event_routing {
            for agent in std::iter::once(&route.lead).chain(route.consult.iter()) {
                if !known(agent) {
                    return Err(AppError::Config(format!(
                        "event route for {} references unknown agent: {}",
                        route.source, agent
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [council]
        id = "core"
        name = "Core platform council"

        [deliberation]
        max_rounds = 2
        require_human_approval = false

        [refinement]
        enabled = true
        max_amendments = 3

        [voting]
        scheme = "supermajority"
        quorum = 2
        preset = "three_quarters"

        [voting.dynamic_weights]
        enabled = true
        bonus_per_match = 0.5
        max_multiplier = 2.0

        [communication]
        policy = "graph"
        edges = [{ from = "arch", to = "sec" }]

        [[agents]]
        id = "arch"
        name = "Architect"
        can_propose = true
        expertise = ["architecture"]

        [[agents]]
        id = "sec"
        can_veto = true
        weight = 1.5
        persistent = true
        expertise = ["security"]

        [[rules]]
        name = "discussion-timeout"
        priority = 10
        trigger = { type = "timeout", phases = ["discussion"], timeout_secs = 600 }
        action = { type = "escalate_to_human", message = "Discussion stalled" }

        [[rules]]
        name = "pull-in-security"
        trigger = { type = "deadlock" }
        action = { type = "add_agent", agent = "sec" }
        stop_after = true

        [[event_routing]]
        source = "github"
        event_type = "issues"
        labels = ["security"]
        lead = "sec"
        consult = ["arch"]
        topics = ["security"]
    "#;

    #[test]
    fn test_parse_sample() {
        let config = CouncilConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.council.id, "core");
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.deliberation.max_rounds, 2);
        assert!(!config.deliberation.require_human_approval);
        assert_eq!(config.deliberation.initial_phase, SessionPhase::Proposal);
        assert_eq!(config.communication.policy, PolicyKind::Graph);
        assert_eq!(config.rules[0].timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.rules[1].priority, 100);
        assert_eq!(config.rules[1].max_fires_per_session, 1);
        assert!(config.rules[1].stop_after);
        assert!(config.agent("sec").unwrap().persistent);
    }

    #[test]
    fn test_scheme_resolved_from_preset() {
        let config = CouncilConfig::from_toml_str(SAMPLE).unwrap();
        match config.voting.scheme() {
            Scheme::Supermajority { threshold } => assert!((threshold - 0.75).abs() < 1e-9),
            other => panic!("unexpected scheme {:?}", other),
        }
    }

    #[test]
    fn test_rule_referencing_unknown_agent_rejected() {
        let raw = SAMPLE.replace(r#"agent = "sec""#, r#"agent = "ghost""#);
        let err = CouncilConfig::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("ghost")));
    }

    #[test]
    fn test_route_referencing_unknown_agent_rejected() {
        let raw = SAMPLE.replace(r#"consult = ["arch"]"#, r#"consult = ["nobody"]"#);
        assert!(CouncilConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn test_timeout_rule_requires_duration() {
        let raw = SAMPLE.replace(", timeout_secs = 600", "");
        assert!(CouncilConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        for secs in ["1e30", "1.8e19", "2592001"] {
            let raw = SAMPLE.replace("timeout_secs = 600", &format!("timeout_secs = {}", secs));
            let result = CouncilConfig::from_toml_str(&raw);
            assert!(matches!(result, Err(AppError::Config(_))), "{}", secs);
        }

        let raw = SAMPLE.replace("timeout_secs = 600", "timeout_secs = 2592000");
        let config = CouncilConfig::from_toml_str(&raw).unwrap();
        assert_eq!(config.rules[0].timeout(), Some(Duration::from_secs(2_592_000)));
    }

    #[test]
    fn test_unrepresentable_timeout_is_none() {
        let mut config = CouncilConfig::from_toml_str(SAMPLE).unwrap();
        config.rules[0].trigger.timeout_secs = Some(1e30);
        assert_eq!(config.rules[0].timeout(), None);
        config.rules[0].trigger.timeout_secs = Some(f64::NAN);
        assert_eq!(config.rules[0].timeout(), None);
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let mut config = CouncilConfig::new("c");
        config.agents.push(AgentConfig::new("a"));
        config.agents.push(AgentConfig::new("a"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_quorum_rejected() {
        let mut config = CouncilConfig::new("c");
        config.voting.quorum = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("council.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = CouncilConfig::load(&path).unwrap();
        assert_eq!(config.event_routing.len(), 1);

        let missing = CouncilConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(AppError::Config(_))));
    }
}
