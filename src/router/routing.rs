use serde::{Deserialize, Serialize};

use crate::models::InboundEvent;

/// Match rule assigning agents to sessions opened from inbound events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRoute {
    pub source: String,
    #[serde(default)]
    pub event_type: Option<String>,
    /// Every listed label must be present on the event
    #[serde(default)]
    pub labels: Vec<String>,
    pub lead: String,
    #[serde(default)]
    pub consult: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl EventRoute {
    pub fn matches(&self, event: &InboundEvent) -> bool {
        if self.source != event.source {
            return false;
        }
        if let Some(event_type) = &self.event_type {
            if event_type != &event.event_type {
                return false;
            }
        }
        if self.labels.is_empty() {
            return true;
        }
        let present = event.labels();
        self.labels
            .iter()
            .all(|wanted| present.iter().any(|label| label.eq_ignore_ascii_case(wanted)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub lead: String,
    pub consult: Vec<String>,
    pub topics: Vec<String>,
}

/// First matching route wins
pub fn route(event: &InboundEvent, routes: &[EventRoute]) -> Option<Assignment> {
    routes
        .iter()
        .find(|r| r.matches(event))
        .map(|r| Assignment {
            lead: r.lead.clone(),
            consult: r.consult.clone(),
            topics: r.topics.clone(),
        })
}
