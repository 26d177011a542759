//! Observer protocol as seen from the CLI
//!
//! Events are kept as raw JSON so the CLI keeps working when the server
//! adds fields or event kinds it does not know about.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Messages from client to server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { session_id: Uuid },
    Unsubscribe,
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or("?")
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// One-line rendering of a server message
pub fn describe(event: &Value) -> String {
    let kind = str_at(event, "/type");
    match kind {
        "session:created" => format!(
            "[{}] session created: {} ({})",
            short_id(str_at(event, "/session/id")),
            str_at(event, "/session/title"),
            str_at(event, "/session/phase"),
        ),
        "session:phase_changed" => format!(
            "[{}] {} -> {} (round {})",
            short_id(str_at(event, "/session_id")),
            str_at(event, "/from"),
            str_at(event, "/to"),
            event.get("round").and_then(Value::as_u64).unwrap_or(0),
        ),
        "message:posted" => format!(
            "[{}] {} {}: {}",
            short_id(str_at(event, "/message/session_id")),
            str_at(event, "/message/message_type"),
            str_at(event, "/message/from_agent_id"),
            first_line(str_at(event, "/message/body")),
        ),
        "amendment:resolved" => format!(
            "[{}] amendment {} {} by {}",
            short_id(str_at(event, "/session_id")),
            short_id(str_at(event, "/amendment_id")),
            str_at(event, "/status"),
            str_at(event, "/resolved_by"),
        ),
        "vote:cast" => format!(
            "[{}] {} voted {}",
            short_id(str_at(event, "/vote/session_id")),
            str_at(event, "/vote/agent_id"),
            str_at(event, "/vote/value"),
        ),
        "vote:concluded" => format!(
            "[{}] vote concluded: {}",
            short_id(str_at(event, "/session_id")),
            str_at(event, "/tally/summary"),
        ),
        "decision:pending_review" | "decision:recorded" => format!(
            "[{}] {}: {} - {}",
            short_id(str_at(event, "/decision/session_id")),
            kind,
            str_at(event, "/decision/outcome"),
            first_line(str_at(event, "/decision/summary")),
        ),
        "event:received" => format!(
            "inbound {} {}",
            str_at(event, "/event/source"),
            str_at(event, "/event/event_type"),
        ),
        "escalation:fired" => format!(
            "[{}] escalation {} ({} -> {})",
            short_id(str_at(event, "/escalation/session_id")),
            str_at(event, "/escalation/rule_name"),
            str_at(event, "/escalation/trigger"),
            str_at(event, "/escalation/action"),
        ),
        "agent:assigned" => format!(
            "[{}] {} assigned as {}",
            short_id(str_at(event, "/session_id")),
            str_at(event, "/agent_id"),
            str_at(event, "/role"),
        ),
        "subscribed" => match event.get("session_id").and_then(Value::as_str) {
            Some(id) => format!("watching session {}", id),
            None => "watching all sessions".to_string(),
        },
        "lagged" => format!(
            "missed {} events",
            event.get("skipped").and_then(Value::as_u64).unwrap_or(0)
        ),
        "error" => format!("server error: {}", str_at(event, "/message")),
        other => format!("{}: {}", other, event),
    }
}
