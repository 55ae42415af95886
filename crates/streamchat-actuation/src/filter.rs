use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::actuator::ChatActuator;
use crate::decision::parse_decision;
use streamchat_foundation::ShutdownGuard;
use streamchat_telemetry::PipelineMetrics;

/// Result of evaluating one completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The message was typed into chat and the cooldown window advanced.
    Dispatched { message: String },
    /// The turn carried no usable decision payload.
    ParseFailed,
    /// Valid payload below the relevance threshold.
    LowRelevancy { relevancy: i64 },
    /// Valid, relevant payload inside the cooldown window.
    Cooldown,
    /// The actuator could not deliver; the cooldown window did NOT advance.
    ActuationFailed,
}

/// Relevance and rate-limit gate in front of the actuator.
///
/// Owns the rate-limit timestamp as a single-writer register: only a
/// confirmed, successful dispatch ever advances it. Evaluation order is
/// the contract: extract, parse, validate, relevance gate, cooldown
/// gate, dispatch, commit-on-success.
pub struct DecisionFilter {
    relevancy_threshold: i64,
    cooldown: Duration,
    last_accepted: Option<Instant>,
}

impl DecisionFilter {
    pub fn new(relevancy_threshold: u8, cooldown: Duration) -> Self {
        Self {
            relevancy_threshold: relevancy_threshold as i64,
            cooldown,
            last_accepted: None,
        }
    }

    pub async fn evaluate(
        &mut self,
        turn_text: &str,
        now: Instant,
        actuator: &dyn ChatActuator,
    ) -> FilterOutcome {
        let payload = match parse_decision(turn_text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Discarding turn: {}", e);
                return FilterOutcome::ParseFailed;
            }
        };

        if payload.relevancy < self.relevancy_threshold {
            tracing::info!(
                "Skipped: low relevancy ({} < {}): {:?}",
                payload.relevancy,
                self.relevancy_threshold,
                payload.message
            );
            return FilterOutcome::LowRelevancy {
                relevancy: payload.relevancy,
            };
        }

        if let Some(last) = self.last_accepted {
            let since = now.saturating_duration_since(last);
            if since < self.cooldown {
                tracing::info!(
                    "Skipped: cooldown ({:?} of {:?} elapsed): {:?}",
                    since,
                    self.cooldown,
                    payload.message
                );
                return FilterOutcome::Cooldown;
            }
        }

        match actuator.type_message(&payload.message).await {
            Ok(true) => {
                // Commit only after the actuator confirmed delivery.
                self.last_accepted = Some(now);
                tracing::info!("Chat message dispatched: {:?}", payload.message);
                FilterOutcome::Dispatched {
                    message: payload.message,
                }
            }
            Ok(false) => {
                tracing::warn!("Actuator declined message; cooldown not consumed");
                FilterOutcome::ActuationFailed
            }
            Err(e) => {
                tracing::warn!("Actuation failed: {}; cooldown not consumed", e);
                FilterOutcome::ActuationFailed
            }
        }
    }
}

/// The dedicated task that serializes all filter evaluations: it is the
/// only writer of the rate-limit state.
pub struct FilterLoop {
    turns_rx: mpsc::Receiver<String>,
    filter: DecisionFilter,
    actuator: Box<dyn ChatActuator>,
    metrics: PipelineMetrics,
    guard: ShutdownGuard,
}

impl FilterLoop {
    pub fn new(
        turns_rx: mpsc::Receiver<String>,
        filter: DecisionFilter,
        actuator: Box<dyn ChatActuator>,
        metrics: PipelineMetrics,
        guard: ShutdownGuard,
    ) -> Self {
        Self {
            turns_rx,
            filter,
            actuator,
            metrics,
            guard,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Filter loop started");
        loop {
            let turn_text = tokio::select! {
                turn = self.turns_rx.recv() => turn,
                _ = self.guard.wait() => break,
            };
            let Some(turn_text) = turn_text else {
                tracing::info!("Receiver gone; filter loop ending");
                break;
            };

            let outcome = self
                .filter
                .evaluate(&turn_text, Instant::now(), self.actuator.as_ref())
                .await;
            match outcome {
                FilterOutcome::Dispatched { .. } => self.metrics.mark_dispatch(),
                FilterOutcome::ParseFailed => {
                    self.metrics.parse_failures.fetch_add(1, Ordering::Relaxed);
                }
                FilterOutcome::LowRelevancy { .. } => {
                    self.metrics
                        .skipped_low_relevancy
                        .fetch_add(1, Ordering::Relaxed);
                }
                FilterOutcome::Cooldown => {
                    self.metrics.skipped_cooldown.fetch_add(1, Ordering::Relaxed);
                }
                FilterOutcome::ActuationFailed => {
                    self.metrics
                        .actuation_failures
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        tracing::info!("Filter loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use streamchat_foundation::ActuationError;

    struct RecordingActuator {
        sent: Arc<Mutex<Vec<String>>>,
        succeed: Arc<Mutex<bool>>,
    }

    impl RecordingActuator {
        fn new() -> (Self, Arc<Mutex<Vec<String>>>, Arc<Mutex<bool>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let succeed = Arc::new(Mutex::new(true));
            (
                Self {
                    sent: sent.clone(),
                    succeed: succeed.clone(),
                },
                sent,
                succeed,
            )
        }
    }

    #[async_trait]
    impl ChatActuator for RecordingActuator {
        async fn is_chat_available(&self) -> bool {
            true
        }

        async fn type_message(&self, text: &str) -> Result<bool, ActuationError> {
            if *self.succeed.lock() {
                self.sent.lock().push(text.to_string());
                Ok(true)
            } else {
                Err(ActuationError::ChatUnavailable)
            }
        }
    }

    const PAYLOAD: &str = r#"{"message":"hi","relevancy":85}"#;

    fn filter() -> DecisionFilter {
        DecisionFilter::new(80, Duration::from_secs(20))
    }

    #[tokio::test]
    async fn accepts_first_relevant_payload_and_commits_timestamp() {
        let (actuator, sent, _) = RecordingActuator::new();
        let mut f = filter();
        let t0 = Instant::now();

        let outcome = f.evaluate(PAYLOAD, t0, &actuator).await;
        assert_eq!(
            outcome,
            FilterOutcome::Dispatched {
                message: "hi".into()
            }
        );
        assert_eq!(sent.lock().as_slice(), ["hi"]);
        assert_eq!(f.last_accepted, Some(t0));
    }

    #[tokio::test]
    async fn cooldown_skips_and_preserves_timestamp() {
        let (actuator, sent, _) = RecordingActuator::new();
        let mut f = filter();
        let t0 = Instant::now();

        f.evaluate(PAYLOAD, t0, &actuator).await;
        // 10s later: inside the 20s window.
        let outcome = f
            .evaluate(PAYLOAD, t0 + Duration::from_secs(10), &actuator)
            .await;
        assert_eq!(outcome, FilterOutcome::Cooldown);
        assert_eq!(sent.lock().len(), 1);
        assert_eq!(f.last_accepted, Some(t0));

        // 20s later: eligible again.
        let outcome = f
            .evaluate(PAYLOAD, t0 + Duration::from_secs(20), &actuator)
            .await;
        assert!(matches!(outcome, FilterOutcome::Dispatched { .. }));
        assert_eq!(sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn low_relevancy_is_skipped_regardless_of_timing() {
        let (actuator, sent, _) = RecordingActuator::new();
        let mut f = filter();

        let outcome = f
            .evaluate(
                r#"{"message":"meh","relevancy":50}"#,
                Instant::now(),
                &actuator,
            )
            .await;
        assert_eq!(outcome, FilterOutcome::LowRelevancy { relevancy: 50 });
        assert!(sent.lock().is_empty());
        assert_eq!(f.last_accepted, None);
    }

    #[tokio::test]
    async fn malformed_turn_changes_nothing() {
        let (actuator, sent, _) = RecordingActuator::new();
        let mut f = filter();

        let outcome = f.evaluate("not json at all", Instant::now(), &actuator).await;
        assert_eq!(outcome, FilterOutcome::ParseFailed);
        assert!(sent.lock().is_empty());
        assert_eq!(f.last_accepted, None);
    }

    #[tokio::test]
    async fn failed_actuation_does_not_consume_the_cooldown() {
        let (actuator, sent, succeed) = RecordingActuator::new();
        let mut f = filter();
        let t0 = Instant::now();

        *succeed.lock() = false;
        let outcome = f.evaluate(PAYLOAD, t0, &actuator).await;
        assert_eq!(outcome, FilterOutcome::ActuationFailed);
        assert_eq!(f.last_accepted, None);

        // Identical payload shortly after: still eligible, since the
        // failed send never advanced the window.
        *succeed.lock() = true;
        let outcome = f
            .evaluate(PAYLOAD, t0 + Duration::from_secs(1), &actuator)
            .await;
        assert!(matches!(outcome, FilterOutcome::Dispatched { .. }));
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn relevance_gate_runs_before_cooldown_gate() {
        let (actuator, _, _) = RecordingActuator::new();
        let mut f = filter();
        let t0 = Instant::now();
        f.evaluate(PAYLOAD, t0, &actuator).await;

        // Low relevancy inside cooldown reports the relevance skip,
        // matching the contract's gate order.
        let outcome = f
            .evaluate(
                r#"{"message":"meh","relevancy":10}"#,
                t0 + Duration::from_secs(5),
                &actuator,
            )
            .await;
        assert_eq!(outcome, FilterOutcome::LowRelevancy { relevancy: 10 });
    }
}
