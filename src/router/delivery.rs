use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::CommunicationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Every agent may reach every other agent
    #[default]
    Broadcast,
    /// Only explicitly listed directed edges are allowed
    Graph,
}

/// Directed permission for `from` to reach `to`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommunicationPolicy {
    kind: PolicyKind,
    edges: HashSet<Edge>,
}

impl CommunicationPolicy {
    pub fn broadcast() -> Self {
        Self {
            kind: PolicyKind::Broadcast,
            edges: HashSet::new(),
        }
    }

    pub fn graph(edges: impl IntoIterator<Item = Edge>) -> Self {
        Self {
            kind: PolicyKind::Graph,
            edges: edges.into_iter().collect(),
        }
    }

    pub fn from_config(config: &CommunicationConfig) -> Self {
        match config.policy {
            PolicyKind::Broadcast => Self::broadcast(),
            PolicyKind::Graph => Self::graph(config.edges.iter().cloned()),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Whether `from` may deliver to `to`. Agents never deliver to themselves.
    pub fn allows(&self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        match self.kind {
            PolicyKind::Broadcast => true,
            PolicyKind::Graph => self.edges.contains(&Edge::new(from, to)),
        }
    }

    /// Delivery set for a message from `from`.
    ///
    /// A directed message reaches its target only if allowed. A broadcast
    /// reaches every allowed member of `audience` except the sender, in
    /// audience order.
    pub fn recipients(&self, from: &str, to: Option<&str>, audience: &[String]) -> Vec<String> {
        match to {
            Some(target) => {
                if self.allows(from, target) {
                    vec![target.to_string()]
                } else {
                    Vec::new()
                }
            }
            None => audience
                .iter()
                .filter(|agent| self.allows(from, agent))
                .cloned()
                .collect(),
        }
    }
}
