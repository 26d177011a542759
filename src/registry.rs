//! Agent registry
//!
//! Runtime state for configured agents: connection status, session
//! assignments and identity tokens. Token resolution authenticates every
//! inbound agent action.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Snapshot of an agent's runtime state
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub state: ConnectionState,
    pub last_seen: Option<DateTime<Utc>>,
    pub sessions: Vec<Uuid>,
    pub persistent: bool,
}

#[derive(Debug)]
struct AgentRuntime {
    config: AgentConfig,
    state: ConnectionState,
    last_seen: Option<DateTime<Utc>>,
    sessions: HashSet<Uuid>,
    stable_token: Option<String>,
}

#[derive(Debug, Clone)]
struct TokenGrant {
    agent_id: String,
    /// Per-session tokens die with their session; persistent tokens have none
    session_id: Option<Uuid>,
}

pub struct AgentRegistry {
    order: Vec<String>,
    agents: RwLock<HashMap<String, AgentRuntime>>,
    tokens: RwLock<HashMap<String, TokenGrant>>,
}

fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

impl AgentRegistry {
    pub fn new(configs: &[AgentConfig]) -> Self {
        let agents = configs
            .iter()
            .map(|config| {
                (
                    config.id.clone(),
                    AgentRuntime {
                        config: config.clone(),
                        state: ConnectionState::Disconnected,
                        last_seen: None,
                        sessions: HashSet::new(),
                        stable_token: None,
                    },
                )
            })
            .collect();

        Self {
            order: configs.iter().map(|c| c.id.clone()).collect(),
            agents: RwLock::new(agents),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Configured agent ids in declaration order
    pub fn agent_ids(&self) -> &[String] {
        &self.order
    }

    pub async fn get(&self, agent_id: &str) -> Option<AgentConfig> {
        let agents = self.agents.read().await;
        agents.get(agent_id).map(|a| a.config.clone())
    }

    pub async fn require(&self, agent_id: &str) -> Result<AgentConfig> {
        self.get(agent_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Agent {}", agent_id)))
    }

    /// All agent configs in declaration order
    pub async fn configs(&self) -> Vec<AgentConfig> {
        let agents = self.agents.read().await;
        self.order
            .iter()
            .filter_map(|id| agents.get(id).map(|a| a.config.clone()))
            .collect()
    }

    /// Issue the token an agent uses for a spawn into `session_id`.
    ///
    /// Persistent agents get one stable token no matter how often this is
    /// called. Everyone else gets a fresh token bound to the session.
    pub async fn issue_token(&self, agent_id: &str, session_id: Uuid) -> Result<String> {
        let mut agents = self.agents.write().await;
        let runtime = agents
            .get_mut(agent_id)
            .ok_or_else(|| AppError::NotFound(format!("Agent {}", agent_id)))?;

        let mut tokens = self.tokens.write().await;
        if runtime.config.persistent {
            if let Some(token) = &runtime.stable_token {
                return Ok(token.clone());
            }
            let token = generate_token();
            tokens.insert(
                token.clone(),
                TokenGrant {
                    agent_id: agent_id.to_string(),
                    session_id: None,
                },
            );
            runtime.stable_token = Some(token.clone());
            return Ok(token);
        }

        let token = generate_token();
        tokens.insert(
            token.clone(),
            TokenGrant {
                agent_id: agent_id.to_string(),
                session_id: Some(session_id),
            },
        );
        Ok(token)
    }

    /// Resolve a token to its agent without touching runtime state
    pub async fn resolve_token(&self, token: &str) -> Option<AgentConfig> {
        let agent_id = {
            let tokens = self.tokens.read().await;
            tokens.get(token)?.agent_id.clone()
        };
        self.get(&agent_id).await
    }

    /// Resolve a token and record the agent as connected and seen
    pub async fn authenticate(&self, token: &str) -> Result<AgentConfig> {
        let agent_id = {
            let tokens = self.tokens.read().await;
            tokens
                .get(token)
                .map(|grant| grant.agent_id.clone())
                .ok_or_else(|| AppError::Forbidden("Unknown agent token".to_string()))?
        };

        let mut agents = self.agents.write().await;
        let runtime = agents
            .get_mut(&agent_id)
            .ok_or_else(|| AppError::NotFound(format!("Agent {}", agent_id)))?;
        runtime.state = ConnectionState::Connected;
        runtime.last_seen = Some(Utc::now());
        Ok(runtime.config.clone())
    }

    /// Record that an agent works on a session. Returns false if it already did.
    pub async fn assign(&self, agent_id: &str, session_id: Uuid) -> Result<bool> {
        let mut agents = self.agents.write().await;
        let runtime = agents
            .get_mut(agent_id)
            .ok_or_else(|| AppError::NotFound(format!("Agent {}", agent_id)))?;
        Ok(runtime.sessions.insert(session_id))
    }

    /// Drop every assignment to a session and revoke its per-session tokens.
    ///
    /// A per-session agent left with no sessions has lost its last token and
    /// counts as disconnected.
    pub async fn release_session(&self, session_id: Uuid) {
        {
            let mut agents = self.agents.write().await;
            for runtime in agents.values_mut() {
                if runtime.sessions.remove(&session_id)
                    && runtime.sessions.is_empty()
                    && !runtime.config.persistent
                {
                    runtime.state = ConnectionState::Disconnected;
                }
            }
        }

        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, grant| grant.session_id != Some(session_id));
        tracing::debug!(
            session_id = %session_id,
            revoked = before - tokens.len(),
            "Released session assignments"
        );
    }

    pub async fn sessions_for(&self, agent_id: &str) -> Vec<Uuid> {
        let agents = self.agents.read().await;
        agents
            .get(agent_id)
            .map(|a| a.sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn status(&self, agent_id: &str) -> Option<AgentStatus> {
        let agents = self.agents.read().await;
        agents.get(agent_id).map(|a| AgentStatus {
            agent_id: a.config.id.clone(),
            state: a.state,
            last_seen: a.last_seen,
            sessions: a.sessions.iter().copied().collect(),
            persistent: a.config.persistent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AgentRegistry {
        let mut persistent = AgentConfig::new("librarian");
        persistent.persistent = true;
        AgentRegistry::new(&[AgentConfig::new("worker"), persistent])
    }

    #[tokio::test]
    async fn test_per_session_tokens_are_fresh() {
        let registry = registry();
        let session = Uuid::new_v4();
        let first = registry.issue_token("worker", session).await.unwrap();
        let second = registry.issue_token("worker", session).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.resolve_token(&first).await.unwrap().id, "worker");
        assert_eq!(registry.resolve_token(&second).await.unwrap().id, "worker");
    }

    #[tokio::test]
    async fn test_persistent_token_is_stable() {
        let registry = registry();
        let first = registry.issue_token("librarian", Uuid::new_v4()).await.unwrap();
        let second = registry.issue_token("librarian", Uuid::new_v4()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_agent_token() {
        let registry = registry();
        let result = registry.issue_token("ghost", Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(registry.resolve_token("nope").await.is_none());
        assert!(matches!(
            registry.authenticate("nope").await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_release_revokes_session_tokens_only() {
        let registry = registry();
        let session = Uuid::new_v4();
        let other = Uuid::new_v4();
        registry.assign("worker", session).await.unwrap();
        registry.assign("librarian", session).await.unwrap();
        registry.assign("librarian", other).await.unwrap();

        let worker_token = registry.issue_token("worker", session).await.unwrap();
        let stable = registry.issue_token("librarian", session).await.unwrap();

        registry.release_session(session).await;

        assert!(registry.resolve_token(&worker_token).await.is_none());
        assert!(registry.resolve_token(&stable).await.is_some());
        assert!(registry.sessions_for("worker").await.is_empty());
        assert_eq!(registry.sessions_for("librarian").await, vec![other]);
    }

    #[tokio::test]
    async fn test_authenticate_marks_connected() {
        let registry = registry();
        let session = Uuid::new_v4();
        registry.assign("worker", session).await.unwrap();
        let token = registry.issue_token("worker", session).await.unwrap();
        let status = registry.status("worker").await.unwrap();
        assert!(status.last_seen.is_none());
        assert_eq!(status.state, ConnectionState::Disconnected);

        let agent = registry.authenticate(&token).await.unwrap();
        assert_eq!(agent.id, "worker");
        let status = registry.status("worker").await.unwrap();
        assert!(status.last_seen.is_some());
        assert_eq!(status.state, ConnectionState::Connected);

        registry.release_session(session).await;
        assert_eq!(
            registry.status("worker").await.unwrap().state,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn test_persistent_agent_stays_connected() {
        let registry = registry();
        let session = Uuid::new_v4();
        registry.assign("librarian", session).await.unwrap();
        let token = registry.issue_token("librarian", session).await.unwrap();
        registry.authenticate(&token).await.unwrap();

        registry.release_session(session).await;
        assert_eq!(
            registry.status("librarian").await.unwrap().state,
            ConnectionState::Connected
        );
        assert_eq!(registry.authenticate(&token).await.unwrap().id, "librarian");
    }

    #[tokio::test]
    async fn test_assign_idempotent() {
        let registry = registry();
        let session = Uuid::new_v4();
        assert!(registry.assign("worker", session).await.unwrap());
        assert!(!registry.assign("worker", session).await.unwrap());
        assert_eq!(registry.configs().await.len(), 2);
        assert_eq!(registry.agent_ids(), &["worker".to_string(), "librarian".to_string()]);
    }
}
