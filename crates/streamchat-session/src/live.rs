use std::collections::VecDeque;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::outbound::OutboundItem;
use crate::transport::{SessionEvent, SessionSink, SessionStream};
use async_trait::async_trait;
use streamchat_foundation::SessionError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Live bidirectional-generation session over WebSocket.
///
/// On connect a JSON setup message selects the model and text-only
/// responses; afterwards outbound items go out as base64 realtime-input
/// media chunks and inbound frames are parsed into text fragments and
/// turn-complete markers.
pub struct LiveSession;

impl LiveSession {
    pub async fn connect(
        url: &str,
        model: &str,
    ) -> Result<(LiveSessionSink, LiveSessionStream), SessionError> {
        tracing::info!("Connecting to session endpoint");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::Connect(format!("Failed to connect: {}", e)))?;

        tracing::info!("Session transport connected");

        let (write, read) = ws_stream.split();
        let mut sink = LiveSessionSink { write };

        let setup = json!({
            "setup": {
                "model": model,
                "generation_config": {
                    "response_modalities": ["TEXT"]
                }
            }
        });
        sink.send_json(&setup).await?;

        Ok((
            sink,
            LiveSessionStream {
                read,
                pending: VecDeque::new(),
            },
        ))
    }
}

pub struct LiveSessionSink {
    write: SplitSink<WsStream, Message>,
}

impl LiveSessionSink {
    async fn send_json(&mut self, value: &Value) -> Result<(), SessionError> {
        self.write
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| SessionError::Send(e.to_string()))
    }
}

#[async_trait]
impl SessionSink for LiveSessionSink {
    async fn send(&mut self, item: OutboundItem) -> Result<(), SessionError> {
        let msg = json!({
            "realtime_input": {
                "media_chunks": [{
                    "mime_type": item.mime_type(),
                    "data": BASE64.encode(item.data()),
                }]
            }
        });
        self.send_json(&msg).await
    }

    async fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        let msg = json!({
            "client_content": {
                "turns": [{
                    "role": "user",
                    "parts": [{ "text": text }]
                }],
                "turn_complete": true
            }
        });
        self.send_json(&msg).await
    }
}

pub struct LiveSessionStream {
    read: SplitStream<WsStream>,
    pending: VecDeque<SessionEvent>,
}

#[async_trait]
impl SessionStream for LiveSessionStream {
    async fn next_event(&mut self) -> Result<Option<SessionEvent>, SessionError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            let msg = match self.read.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Err(SessionError::MalformedEvent(e.to_string()));
                }
                None => return Ok(None),
            };

            let payload = match msg {
                Message::Text(text) => text.to_string(),
                Message::Binary(bytes) => String::from_utf8_lossy(&bytes).to_string(),
                Message::Close(_) => {
                    tracing::info!("Session transport closed by server");
                    return Ok(None);
                }
                // Ping/pong handled by the library; nothing for us.
                _ => continue,
            };

            let value: Value = serde_json::from_str(&payload)
                .map_err(|e| SessionError::MalformedEvent(format!("invalid JSON: {}", e)))?;
            self.pending.extend(parse_server_message(&value));
        }
    }
}

/// Flatten one server message into session events. Unknown messages
/// (setup acks and the like) produce nothing.
fn parse_server_message(value: &Value) -> Vec<SessionEvent> {
    let mut events = Vec::new();

    let Some(content) = value
        .get("serverContent")
        .or_else(|| value.get("server_content"))
    else {
        return events;
    };

    let parts = content
        .get("modelTurn")
        .or_else(|| content.get("model_turn"))
        .and_then(|turn| turn.get("parts"))
        .and_then(Value::as_array);
    if let Some(parts) = parts {
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                events.push(SessionEvent::Text(text.to_string()));
            }
        }
    }

    let turn_complete = content
        .get("turnComplete")
        .or_else(|| content.get("turn_complete"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if turn_complete {
        events.push(SessionEvent::TurnComplete);
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_parts_in_order() {
        let value: Value = serde_json::from_str(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":"Hello"},{"text":", world"}]}}}"#,
        )
        .unwrap();
        assert_eq!(
            parse_server_message(&value),
            vec![
                SessionEvent::Text("Hello".into()),
                SessionEvent::Text(", world".into())
            ]
        );
    }

    #[test]
    fn turn_complete_follows_final_fragment() {
        let value: Value = serde_json::from_str(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":"done"}]},"turnComplete":true}}"#,
        )
        .unwrap();
        assert_eq!(
            parse_server_message(&value),
            vec![
                SessionEvent::Text("done".into()),
                SessionEvent::TurnComplete
            ]
        );
    }

    #[test]
    fn snake_case_wire_form_is_accepted() {
        let value: Value =
            serde_json::from_str(r#"{"server_content":{"turn_complete":true}}"#).unwrap();
        assert_eq!(parse_server_message(&value), vec![SessionEvent::TurnComplete]);
    }

    #[test]
    fn setup_ack_produces_no_events() {
        let value: Value = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(parse_server_message(&value).is_empty());
    }
}
