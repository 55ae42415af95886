use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;

/// Installs the Ctrl-C and panic hooks and hands out cloneable guards
/// that the pipeline tasks use for group cancellation: any task may
/// request shutdown, every task observes it.
pub struct ShutdownHandler {
    shutdown_requested: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl ShutdownHandler {
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    pub async fn install(self) -> ShutdownGuard {
        let shutdown_requested = Arc::clone(&self.shutdown_requested);
        let shutdown_notify = Arc::clone(&self.shutdown_notify);

        tokio::spawn(async move {
            if signal::ctrl_c().await.is_err() {
                tracing::error!("Failed to install Ctrl-C handler");
                return;
            }
            tracing::info!("Shutdown requested via Ctrl-C");
            shutdown_requested.store(true, Ordering::SeqCst);
            shutdown_notify.notify_waiters();
        });

        let original_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            tracing::error!("PANIC: {}", panic_info);
            original_panic(panic_info);
        }));

        ShutdownGuard {
            shutdown_requested: self.shutdown_requested,
            shutdown_notify: self.shutdown_notify,
        }
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ShutdownGuard {
    shutdown_requested: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl ShutdownGuard {
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested. Safe to call after the
    /// fact; the flag is latched.
    pub async fn wait(&self) {
        let notified = self.shutdown_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn request_propagates_to_all_guards() {
        let handler = ShutdownHandler::new();
        let guard = ShutdownGuard {
            shutdown_requested: Arc::clone(&handler.shutdown_requested),
            shutdown_notify: Arc::clone(&handler.shutdown_notify),
        };
        let peer = guard.clone();
        assert!(!peer.is_shutdown_requested());

        let waiter = tokio::spawn(async move {
            peer.wait().await;
            true
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        guard.request_shutdown();
        assert!(waiter.await.unwrap());
        assert!(guard.is_shutdown_requested());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_requested() {
        let handler = ShutdownHandler::new();
        let guard = ShutdownGuard {
            shutdown_requested: Arc::clone(&handler.shutdown_requested),
            shutdown_notify: Arc::clone(&handler.shutdown_notify),
        };
        guard.request_shutdown();
        tokio::time::timeout(Duration::from_millis(100), guard.wait())
            .await
            .expect("wait() must not block after shutdown was requested");
    }
}
