//! WebSocket observer integration tests

mod common;

use common::{council_config, TestCouncil};
use futures::{SinkExt, StreamExt};
use council::models::NewSession;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn setup_server() -> (SocketAddr, TestCouncil) {
    let council = TestCouncil::start(council_config()).await;
    let app = council::build_router(council.state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, council)
}

async fn connect(addr: SocketAddr) -> Client {
    let url = format!("ws://{}/ws", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    // Let the handler subscribe to the bus before anything is published
    tokio::time::sleep(Duration::from_millis(50)).await;
    ws_stream
}

async fn next_json(ws: &mut Client) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for message")
        .unwrap()
        .unwrap();
    match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected text message, got {:?}", other),
    }
}

fn session(title: &str, lead: &str) -> NewSession {
    NewSession {
        title: title.to_string(),
        lead: Some(lead.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_websocket_streams_events() {
    let (addr, council) = setup_server().await;
    let mut ws = connect(addr).await;

    let created = council
        .state
        .orchestrator
        .start_session(session("Pick a cache", "architect"))
        .await
        .unwrap();

    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "session:created");
    assert_eq!(event["session"]["id"], created.id.to_string());
    assert_eq!(event["session"]["phase"], "proposal");

    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "agent:assigned");
    assert_eq!(event["agent_id"], "architect");
    assert_eq!(event["role"], "lead");
}

#[tokio::test]
async fn test_websocket_session_filter() {
    let (addr, council) = setup_server().await;
    let orch = &council.state.orchestrator;

    let watched = orch.start_session(session("Watched", "architect")).await.unwrap();
    let mut ws = connect(addr).await;

    let msg = serde_json::json!({"type": "subscribe", "session_id": watched.id});
    ws.send(Message::Text(msg.to_string().into())).await.unwrap();
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "subscribed");
    assert_eq!(ack["session_id"], watched.id.to_string());

    orch.start_session(session("Ignored", "perf")).await.unwrap();
    orch.submit_finding(watched.id, "security", "Cache keys include user ids")
        .await
        .unwrap();

    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "message:posted");
    assert_eq!(event["message"]["session_id"], watched.id.to_string());
    assert_eq!(event["message"]["message_type"], "finding");

    ws.send(Message::Text(r#"{"type":"unsubscribe"}"#.into()))
        .await
        .unwrap();
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "subscribed");
    assert!(ack["session_id"].is_null());
}

#[tokio::test]
async fn test_websocket_rejects_commands() {
    let (addr, _council) = setup_server().await;
    let mut ws = connect(addr).await;

    let msg = serde_json::json!({"type": "cast_vote", "value": "approve"});
    ws.send(Message::Text(msg.to_string().into())).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .contains("Invalid message"));
}
