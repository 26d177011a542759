//! WebSocket observer stream
//!
//! Pushes every council event to the connected client as JSON. Clients can
//! narrow the stream to one session; nothing sent over the socket changes
//! council state.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use crate::events::CouncilEvent;
use crate::AppState;

/// WebSocket handler
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.bus.subscribe());
    let mut filter: Option<Uuid> = None;

    tracing::debug!("Observer connected");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Subscribe { session_id }) => {
                        filter = Some(session_id);
                        ServerMessage::Subscribed { session_id: filter }
                    }
                    Ok(ClientMessage::Unsubscribe) => {
                        filter = None;
                        ServerMessage::Subscribed { session_id: None }
                    }
                    Err(e) => ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    },
                };
                if send_json(&mut sender, &reply).await.is_err() {
                    break;
                }
            }
            event = events.next() => {
                match event {
                    Some(Ok(event)) => {
                        if !wanted(&event, filter) {
                            continue;
                        }
                        if send_json(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::warn!(skipped, "Observer lagged behind the event bus");
                        if send_json(&mut sender, &ServerMessage::Lagged { skipped }).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    tracing::debug!("Observer disconnected");
}

/// Events without a session always pass the filter
fn wanted(event: &CouncilEvent, filter: Option<Uuid>) -> bool {
    match (filter, event.session_id()) {
        (Some(wanted), Some(id)) => wanted == id,
        _ => true,
    }
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), ()> {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to serialize observer message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|e| {
        tracing::debug!("Failed to send to observer: {}", e);
    })
}

/// Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { session_id: Uuid },
    Unsubscribe,
}

/// Control messages from server to client; events are sent as-is
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { session_id: Option<Uuid> },
    Lagged { skipped: u64 },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InboundEvent, Session, SessionPhase};

    #[test]
    fn test_client_message_parsing() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"subscribe","session_id":"{}"}}"#, id);
        match serde_json::from_str::<ClientMessage>(&raw).unwrap() {
            ClientMessage::Subscribe { session_id } => assert_eq!(session_id, id),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"unsubscribe"}"#).unwrap(),
            ClientMessage::Unsubscribe
        ));
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"vote"}"#).is_err());
    }

    #[test]
    fn test_session_filter() {
        let session = Session::new("c", "t", SessionPhase::Discussion);
        let created = CouncilEvent::SessionCreated {
            session: session.clone(),
        };
        let inbound = CouncilEvent::InboundReceived {
            event: InboundEvent::new("github", "issues", serde_json::json!({})),
        };

        assert!(wanted(&created, None));
        assert!(wanted(&created, Some(session.id)));
        assert!(!wanted(&created, Some(Uuid::new_v4())));
        assert!(wanted(&inbound, Some(session.id)));
    }

    #[test]
    fn test_server_message_serialization() {
        let json = serde_json::to_value(ServerMessage::Lagged { skipped: 3 }).unwrap();
        assert_eq!(json["type"], "lagged");
        assert_eq!(json["skipped"], 3);
    }
}
