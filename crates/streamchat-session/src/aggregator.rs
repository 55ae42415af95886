use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

use crate::transport::{SessionEvent, SessionStream};
use streamchat_foundation::ShutdownGuard;
use streamchat_telemetry::PipelineMetrics;

/// Accumulates reply fragments into one complete turn.
///
/// Two states: Idle (no fragments) and Open (accumulating). The first
/// non-empty fragment opens a turn; `complete_turn` closes it and
/// yields the concatenated text, or None for an empty completion.
/// Exactly one aggregator exists per receiver loop, so concurrent
/// turns cannot occur by construction.
#[derive(Default)]
pub struct TurnAggregator {
    fragments: Vec<String>,
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        !self.fragments.is_empty()
    }

    /// Append a fragment to the open turn, opening one if needed.
    /// Empty fragments are ignored and do not open a turn.
    pub fn push_fragment(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.fragments.push(text.to_string());
    }

    /// Close the current turn. Returns the fragments concatenated in
    /// arrival order, or None when no fragments were accumulated.
    pub fn complete_turn(&mut self) -> Option<String> {
        if self.fragments.is_empty() {
            return None;
        }
        let text = self.fragments.concat();
        self.fragments.clear();
        Some(text)
    }
}

/// Consumes the session reply stream, drives the turn aggregator, and
/// hands each completed turn to the decision stage.
///
/// Handshake convention: everything up to and including the first
/// turn-completion after connect is the session acknowledging the
/// system message, and is discarded.
pub struct ReceiverLoop<S: SessionStream> {
    stream: S,
    turns_tx: mpsc::Sender<String>,
    metrics: PipelineMetrics,
    guard: ShutdownGuard,
}

impl<S: SessionStream> ReceiverLoop<S> {
    pub fn new(
        stream: S,
        turns_tx: mpsc::Sender<String>,
        metrics: PipelineMetrics,
        guard: ShutdownGuard,
    ) -> Self {
        Self {
            stream,
            turns_tx,
            metrics,
            guard,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Receiver loop started");
        let mut aggregator = TurnAggregator::new();
        let mut in_handshake = true;

        loop {
            let event = tokio::select! {
                event = self.stream.next_event() => event,
                _ = self.guard.wait() => break,
            };

            match event {
                Ok(Some(SessionEvent::Text(text))) => {
                    if in_handshake {
                        tracing::trace!("Discarding pre-handshake fragment ({} chars)", text.len());
                    } else {
                        aggregator.push_fragment(&text);
                    }
                }
                Ok(Some(SessionEvent::TurnComplete)) => {
                    if in_handshake {
                        in_handshake = false;
                        tracing::info!("Session handshake complete, entering steady state");
                        continue;
                    }
                    self.metrics.turns_completed.fetch_add(1, Ordering::Relaxed);
                    match aggregator.complete_turn() {
                        Some(turn_text) => {
                            if self.turns_tx.send(turn_text).await.is_err() {
                                tracing::info!("Decision stage gone; receiver loop ending");
                                break;
                            }
                        }
                        None => {
                            tracing::debug!("Empty turn completion, nothing to evaluate");
                        }
                    }
                }
                Ok(None) => {
                    tracing::warn!("Session reply stream ended");
                    self.guard.request_shutdown();
                    break;
                }
                Err(e) => {
                    // A single malformed reply never takes the loop down.
                    tracing::warn!("Malformed session event: {}", e);
                }
            }
        }
        tracing::info!("Receiver loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use streamchat_foundation::{SessionError, ShutdownHandler};

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let mut agg = TurnAggregator::new();
        agg.push_fragment("Hello");
        agg.push_fragment(", ");
        agg.push_fragment("world");
        assert!(agg.is_open());
        assert_eq!(agg.complete_turn().as_deref(), Some("Hello, world"));
        assert!(!agg.is_open());
    }

    #[test]
    fn empty_completion_is_a_noop() {
        let mut agg = TurnAggregator::new();
        assert_eq!(agg.complete_turn(), None);
        agg.push_fragment("");
        assert_eq!(agg.complete_turn(), None);
    }

    #[test]
    fn buffer_clears_between_turns() {
        let mut agg = TurnAggregator::new();
        agg.push_fragment("one");
        assert_eq!(agg.complete_turn().as_deref(), Some("one"));
        agg.push_fragment("two");
        assert_eq!(agg.complete_turn().as_deref(), Some("two"));
    }

    struct ScriptedStream {
        events: VecDeque<Result<Option<SessionEvent>, SessionError>>,
    }

    #[async_trait]
    impl SessionStream for ScriptedStream {
        async fn next_event(&mut self) -> Result<Option<SessionEvent>, SessionError> {
            self.events.pop_front().unwrap_or(Ok(None))
        }
    }

    async fn run_receiver(
        events: Vec<Result<Option<SessionEvent>, SessionError>>,
    ) -> (Vec<String>, PipelineMetrics) {
        let metrics = PipelineMetrics::default();
        let guard = ShutdownHandler::new().install().await;
        let (turns_tx, mut turns_rx) = mpsc::channel(16);
        let stream = ScriptedStream {
            events: events.into(),
        };
        ReceiverLoop::new(stream, turns_tx, metrics.clone(), guard)
            .run()
            .await;

        let mut turns = Vec::new();
        while let Ok(turn) = turns_rx.try_recv() {
            turns.push(turn);
        }
        (turns, metrics)
    }

    #[tokio::test]
    async fn handshake_turn_is_discarded() {
        let (turns, metrics) = run_receiver(vec![
            Ok(Some(SessionEvent::Text("ack".into()))),
            Ok(Some(SessionEvent::TurnComplete)),
            Ok(Some(SessionEvent::Text("Hello".into()))),
            Ok(Some(SessionEvent::Text(", world".into()))),
            Ok(Some(SessionEvent::TurnComplete)),
        ])
        .await;
        assert_eq!(turns, vec!["Hello, world".to_string()]);
        assert_eq!(metrics.snapshot().turns_completed, 1);
    }

    #[tokio::test]
    async fn malformed_event_does_not_stop_the_loop() {
        let (turns, _) = run_receiver(vec![
            Ok(Some(SessionEvent::TurnComplete)), // handshake
            Err(SessionError::MalformedEvent("bad frame".into())),
            Ok(Some(SessionEvent::Text("still here".into()))),
            Ok(Some(SessionEvent::TurnComplete)),
        ])
        .await;
        assert_eq!(turns, vec!["still here".to_string()]);
    }

    #[tokio::test]
    async fn empty_turn_produces_no_decision_call() {
        let (turns, metrics) = run_receiver(vec![
            Ok(Some(SessionEvent::TurnComplete)), // handshake
            Ok(Some(SessionEvent::TurnComplete)), // empty steady-state turn
        ])
        .await;
        assert!(turns.is_empty());
        assert_eq!(metrics.snapshot().turns_completed, 1);
    }
}
