use async_trait::async_trait;

use crate::outbound::OutboundItem;
use streamchat_foundation::SessionError;

/// One event off the session's reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Incremental text fragment of the current turn.
    Text(String),
    /// The current turn is complete.
    TurnComplete,
}

/// Outbound half of the session link.
#[async_trait]
pub trait SessionSink: Send {
    /// Forward one multiplexed item (audio PCM or encoded image).
    async fn send(&mut self, item: OutboundItem) -> Result<(), SessionError>;

    /// Send a full text turn (used once, for the system message).
    async fn send_text(&mut self, text: &str) -> Result<(), SessionError>;
}

/// Inbound half of the session link: an ordered, unbounded sequence of
/// reply events. `Ok(None)` means the stream ended cleanly.
#[async_trait]
pub trait SessionStream: Send {
    async fn next_event(&mut self) -> Result<Option<SessionEvent>, SessionError>;
}
