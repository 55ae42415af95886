use std::time::Duration;

use async_trait::async_trait;

use streamchat_foundation::{ActuationError, ShutdownGuard};

/// Collaborator that puts an accepted message into the streaming site's
/// chat box. `type_message` returning Ok(false) means the chat surface
/// could not be used right now; the caller must not treat the message
/// as delivered.
#[async_trait]
pub trait ChatActuator: Send + Sync {
    async fn is_chat_available(&self) -> bool;

    async fn type_message(&self, text: &str) -> Result<bool, ActuationError>;
}

/// Block until the chat surface is reachable, polling once per
/// interval. Returns false when shutdown is requested first; the
/// pipeline must not enter steady state in that case.
pub async fn wait_until_available(
    actuator: &dyn ChatActuator,
    poll_interval: Duration,
    guard: &ShutdownGuard,
) -> bool {
    loop {
        if actuator.is_chat_available().await {
            return true;
        }
        tracing::info!(
            "Chat surface not available yet, retrying in {:?}",
            poll_interval
        );
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = guard.wait() => return false,
        }
    }
}

/// Dry-run actuator: logs what would have been typed and reports
/// success. Used by `--dry-run` and in tests.
pub struct NoopActuator;

#[async_trait]
impl ChatActuator for NoopActuator {
    async fn is_chat_available(&self) -> bool {
        true
    }

    async fn type_message(&self, text: &str) -> Result<bool, ActuationError> {
        tracing::info!("[dry-run] would send chat message: {}", text);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use streamchat_foundation::ShutdownHandler;

    struct LateChat {
        polls: Arc<AtomicU32>,
        ready_after: u32,
    }

    #[async_trait]
    impl ChatActuator for LateChat {
        async fn is_chat_available(&self) -> bool {
            self.polls.fetch_add(1, Ordering::SeqCst) + 1 > self.ready_after
        }

        async fn type_message(&self, _text: &str) -> Result<bool, ActuationError> {
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_the_surface_appears() {
        let polls = Arc::new(AtomicU32::new(0));
        let actuator = LateChat {
            polls: polls.clone(),
            ready_after: 3,
        };
        let guard = ShutdownHandler::new().install().await;

        let ready = wait_until_available(&actuator, Duration::from_secs(2), &guard).await;
        assert!(ready);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_the_wait() {
        let actuator = LateChat {
            polls: Arc::new(AtomicU32::new(0)),
            ready_after: u32::MAX,
        };
        let guard = ShutdownHandler::new().install().await;
        let stop = guard.clone();
        let waiter = tokio::spawn(async move {
            wait_until_available(&actuator, Duration::from_secs(2), &stop).await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        guard.request_shutdown();
        assert!(!waiter.await.unwrap());
    }
}
