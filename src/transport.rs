use anyhow::{Result, anyhow};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::utils::next_id;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Messages sent to the transport actor.
#[derive(Debug)]
pub(crate) enum TransportMessage {
    /// A request command with a response sender.
    Request(Value, oneshot::Sender<Result<TransportResponse>>),
    /// Listener for the session reply with the given ID.
    ListenTargetMessage(u64, oneshot::Sender<Result<TransportResponse>>),
    /// Listener for the next event `method` raised in session `session_id`.
    ListenEvent(EventKey, oneshot::Sender<Value>),
    /// Listener for every event `method` raised in session `session_id`.
    Subscribe(EventKey, mpsc::UnboundedSender<Value>),
    /// Command to shut down the transport.
    Shutdown,
}

/// Responses produced by the transport actor.
#[derive(Debug)]
pub(crate) enum TransportResponse {
    Response(Response),
    Target(TargetMessage),
}

/// A browser-level CDP response.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) result: Value,
}

/// A `Target.receivedMessageFromTarget` notification.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TargetMessage {
    pub(crate) params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct EventKey {
    pub(crate) session_id: String,
    pub(crate) method: String,
}

/// Classification of a raw text frame read from the DevTools socket.
#[derive(Debug)]
enum Incoming {
    Response(Response),
    TargetReply(u64, TargetMessage),
    TargetEvent(EventKey, Value),
    Ignored,
}

fn classify(text: &str) -> Incoming {
    if let Ok(response) = serde_json::from_str::<Response>(text) {
        return Incoming::Response(response);
    }
    let Ok(target_msg) = serde_json::from_str::<TargetMessage>(text) else {
        return Incoming::Ignored;
    };
    let Some(inner) = target_msg
        .params
        .get("message")
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
    else {
        return Incoming::Ignored;
    };

    if let Some(id) = inner.get("id").and_then(|i| i.as_u64()) {
        Incoming::TargetReply(id, target_msg)
    } else if let (Some(method), Some(session_id)) = (
        inner.get("method").and_then(|m| m.as_str()),
        target_msg.params.get("sessionId").and_then(|s| s.as_str()),
    ) {
        let key = EventKey {
            session_id: session_id.to_string(),
            method: method.to_string(),
        };
        Incoming::TargetEvent(key, inner["params"].clone())
    } else {
        Incoming::Ignored
    }
}

/// Owns the WebSocket and matches replies and events to their waiters.
struct TransportActor {
    pending_requests: HashMap<u64, oneshot::Sender<Result<TransportResponse>>>,
    event_listeners: HashMap<EventKey, Vec<oneshot::Sender<Value>>>,
    subscriptions: HashMap<EventKey, Vec<mpsc::UnboundedSender<Value>>>,
    ws_sink: SplitSink<WsStream, Message>,
    command_rx: mpsc::Receiver<TransportMessage>,
}

impl TransportActor {
    async fn run(mut self, mut ws_stream: SplitStream<WsStream>) {
        loop {
            tokio::select! {
                Some(msg) = ws_stream.next() => {
                    match msg {
                        Ok(Message::Text(text)) => self.dispatch(&text),
                        Ok(Message::Close(_)) | Err(_) => break,
                        _ => {}
                    }
                }
                Some(msg) = self.command_rx.recv() => {
                    match msg {
                        TransportMessage::Request(cmd, tx) => {
                            if let Some(id) = cmd["id"].as_u64()
                                && let Ok(text) = serde_json::to_string(&cmd)
                            {
                                if self.ws_sink.send(Message::Text(text)).await.is_ok() {
                                    self.pending_requests.insert(id, tx);
                                } else {
                                    let _ = tx.send(Err(anyhow!("WebSocket send failed")));
                                }
                            }
                        }
                        TransportMessage::ListenTargetMessage(id, tx) => {
                            self.pending_requests.insert(id, tx);
                        }
                        TransportMessage::ListenEvent(key, tx) => {
                            self.event_listeners.entry(key).or_default().push(tx);
                        }
                        TransportMessage::Subscribe(key, tx) => {
                            self.subscriptions.entry(key).or_default().push(tx);
                        }
                        TransportMessage::Shutdown => {
                            let _ = self.ws_sink.send(Message::Text(json!({
                                "id": next_id(),
                                "method": "Browser.close",
                                "params": {}
                            }).to_string())).await;
                            let _ = self.ws_sink.close().await;
                            break;
                        }
                    }
                }
                else => break,
            }
        }
        debug!("CDP transport closed");
    }

    fn dispatch(&mut self, text: &str) {
        match classify(text) {
            Incoming::Response(response) => {
                if let Some(sender) = self.pending_requests.remove(&response.id) {
                    let _ = sender.send(Ok(TransportResponse::Response(response)));
                }
            }
            Incoming::TargetReply(id, target_msg) => {
                if let Some(sender) = self.pending_requests.remove(&id) {
                    let _ = sender.send(Ok(TransportResponse::Target(target_msg)));
                }
            }
            Incoming::TargetEvent(key, params) => {
                if let Some(subscribers) = self.subscriptions.get_mut(&key) {
                    subscribers.retain(|tx| tx.send(params.clone()).is_ok());
                }
                if let Some(listeners) = self.event_listeners.remove(&key) {
                    trace!("event {} for session {}", key.method, key.session_id);
                    for tx in listeners {
                        let _ = tx.send(params.clone());
                    }
                }
            }
            Incoming::Ignored => {}
        }
    }
}

/// Asynchronous transport to the Chrome DevTools Protocol over WebSocket.
#[derive(Debug)]
pub(crate) struct Transport {
    tx: mpsc::Sender<TransportMessage>,
    timeout: Duration,
}

impl Transport {
    /// Connects to the DevTools WebSocket URL and spawns the transport actor.
    pub(crate) async fn new(ws_url: &str, timeout: Duration) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(100);

        let actor = TransportActor {
            pending_requests: HashMap::new(),
            event_listeners: HashMap::new(),
            subscriptions: HashMap::new(),
            ws_sink,
            command_rx: rx,
        };
        tokio::spawn(actor.run(ws_stream));

        Ok(Self { tx, timeout })
    }

    /// Sends a command and awaits its response.
    pub(crate) async fn send(&self, command: Value) -> Result<TransportResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::Request(command, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        time::timeout(self.timeout, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for response"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Waits for a specific target message by ID.
    pub(crate) async fn get_target_msg(&self, msg_id: usize) -> Result<TransportResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::ListenTargetMessage(msg_id as u64, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        time::timeout(self.timeout, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for target message"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Registers a one-shot listener for the next `method` event of a session.
    ///
    /// Register before triggering the action that raises the event.
    pub(crate) async fn listen_for_event(
        &self,
        session_id: &str,
        method: &str,
    ) -> Result<oneshot::Receiver<Value>> {
        let (tx, rx) = oneshot::channel();
        let key = EventKey {
            session_id: session_id.to_string(),
            method: method.to_string(),
        };
        self.tx
            .send(TransportMessage::ListenEvent(key, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    /// Streams every `method` event of a session until the receiver is dropped.
    pub(crate) async fn subscribe(
        &self,
        session_id: &str,
        method: &str,
    ) -> Result<mpsc::UnboundedReceiver<Value>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = EventKey {
            session_id: session_id.to_string(),
            method: method.to_string(),
        };
        self.tx
            .send(TransportMessage::Subscribe(key, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    /// Initiates a graceful shutdown of the transport.
    pub(crate) async fn shutdown(&self) {
        let _ = self.tx.send(TransportMessage::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_browser_response() {
        match classify(r#"{"id":4,"result":{"targetId":"T1"}}"#) {
            Incoming::Response(r) => {
                assert_eq!(r.id, 4);
                assert_eq!(r.result["targetId"], "T1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classifies_session_reply() {
        let inner = json!({ "id": 12, "result": {} }).to_string();
        let frame = json!({
            "method": "Target.receivedMessageFromTarget",
            "params": { "sessionId": "S1", "message": inner }
        })
        .to_string();
        assert!(matches!(classify(&frame), Incoming::TargetReply(12, _)));
    }

    #[test]
    fn classifies_session_event() {
        let inner = json!({ "method": "Page.loadEventFired", "params": { "timestamp": 1.5 } }).to_string();
        let frame = json!({
            "method": "Target.receivedMessageFromTarget",
            "params": { "sessionId": "S9", "message": inner }
        })
        .to_string();
        match classify(&frame) {
            Incoming::TargetEvent(key, params) => {
                assert_eq!(key.session_id, "S9");
                assert_eq!(key.method, "Page.loadEventFired");
                assert_eq!(params["timestamp"], 1.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ignores_unrelated_frames() {
        assert!(matches!(
            classify(r#"{"method":"Target.targetCreated","params":{"targetInfo":{}}}"#),
            Incoming::Ignored
        ));
        assert!(matches!(classify("not json"), Incoming::Ignored));
    }
}
