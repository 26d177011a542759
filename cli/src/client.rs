//! WebSocket client for the council observer stream

use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use crate::messages::ClientMessage;

pub struct ObserverClient {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Value>,
    handle: tokio::task::JoinHandle<()>,
}

impl ObserverClient {
    /// Connect to a council server's `/ws` endpoint
    pub async fn connect(url: &str) -> Result<Self> {
        let url = url::Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(anyhow!("Expected a ws:// or wss:// URL, got {}", url));
        }
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(32);
        let (in_tx, in_rx) = mpsc::channel::<Value>(256);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(msg) = out_rx.recv() => {
                        if write.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Some(result) = read.next() => {
                        match result {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<Value>(&text) {
                                    Ok(value) => {
                                        if in_tx.send(value).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse message: {} - {}", e, text);
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Err(e) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    else => break,
                }
            }
        });

        tracing::info!("Connected successfully");

        Ok(Self {
            tx: out_tx,
            rx: in_rx,
            handle,
        })
    }

    async fn send(&self, msg: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.tx
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| anyhow!("Failed to send message: {}", e))
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Narrow the stream to one session and wait for the ack
    pub async fn subscribe(&mut self, session_id: Uuid) -> Result<()> {
        self.send(ClientMessage::Subscribe { session_id }).await?;

        while let Some(msg) = self.recv().await {
            match msg.get("type").and_then(Value::as_str) {
                Some("subscribed") => return Ok(()),
                Some("error") => {
                    return Err(anyhow!(
                        "Server error: {}",
                        msg.get("message").and_then(Value::as_str).unwrap_or("unknown")
                    ));
                }
                _ => continue,
            }
        }

        Err(anyhow!("Connection closed"))
    }

    /// Listen for events until callback returns false
    pub async fn listen<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(Value) -> bool,
    {
        while let Some(msg) = self.recv().await {
            if !callback(msg) {
                break;
            }
        }
        Ok(())
    }
}

impl Drop for ObserverClient {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_http_urls() {
        let err = ObserverClient::connect("http://localhost:3000/ws")
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("ws://"));
    }

    #[tokio::test]
    async fn test_rejects_garbage_urls() {
        assert!(ObserverClient::connect("not a url").await.is_err());
    }
}
