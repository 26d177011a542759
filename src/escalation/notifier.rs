use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{EscalationEvent, Session};

/// Outbound notification port for `notify_external`
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, url: &str, payload: Value) -> Result<()>;
}

/// POSTs JSON payloads to webhooks
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, url: &str, payload: Value) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Notify(format!(
                "Webhook {} rejected notification: {} - {}",
                url, status, text
            )));
        }

        Ok(())
    }
}

/// Keeps every payload instead of sending it
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, url: &str, payload: Value) -> Result<()> {
        self.sent.lock().await.push((url.to_string(), payload));
        Ok(())
    }
}

/// `{session, escalation}` laid over the rule's template object.
///
/// Template keys survive unless they collide with `session` or `escalation`.
pub fn build_payload(
    template: Option<&Value>,
    session: &Session,
    escalation: &EscalationEvent,
) -> Value {
    let mut payload = match template {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => json!({}),
    };

    if let Value::Object(map) = &mut payload {
        map.insert("session".to_string(), json!(session));
        map.insert("escalation".to_string(), json!(escalation));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionType, SessionPhase, TriggerType};

    fn fixtures() -> (Session, EscalationEvent) {
        let session = Session::new("core", "Rotate keys", SessionPhase::Discussion);
        let event = EscalationEvent::new(
            session.id,
            "stalled",
            TriggerType::Timeout,
            ActionType::NotifyExternal,
            "discussion timed out",
        );
        (session, event)
    }

    #[test]
    fn test_payload_merges_template() {
        let (session, event) = fixtures();
        let template = json!({ "channel": "#council", "session": "overwritten" });
        let payload = build_payload(Some(&template), &session, &event);
        assert_eq!(payload["channel"], "#council");
        assert_eq!(payload["session"]["title"], "Rotate keys");
        assert_eq!(payload["escalation"]["rule_name"], "stalled");
    }

    #[test]
    fn test_payload_without_template() {
        let (session, event) = fixtures();
        let payload = build_payload(Some(&json!("not an object")), &session, &event);
        assert_eq!(payload.as_object().unwrap().len(), 2);
        let payload = build_payload(None, &session, &event);
        assert_eq!(payload["escalation"]["trigger"], "timeout");
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier
            .notify("http://hooks.local/x", json!({ "a": 1 }))
            .await
            .unwrap();
        let sent = notifier.sent().await;
        assert_eq!(sent[0].0, "http://hooks.local/x");
    }
}
