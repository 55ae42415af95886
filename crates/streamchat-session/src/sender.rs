use crate::outbound::MuxReceiver;
use crate::transport::SessionSink;
use std::sync::atomic::Ordering;
use streamchat_foundation::ShutdownGuard;
use streamchat_telemetry::PipelineMetrics;

/// Drains the multiplexer one item at a time into the session sink.
/// Only the empty queue or the transport itself may stall this loop.
pub struct SenderLoop<S: SessionSink> {
    mux_rx: MuxReceiver,
    sink: S,
    metrics: PipelineMetrics,
    guard: ShutdownGuard,
}

impl<S: SessionSink> SenderLoop<S> {
    pub fn new(
        mux_rx: MuxReceiver,
        sink: S,
        metrics: PipelineMetrics,
        guard: ShutdownGuard,
    ) -> Self {
        Self {
            mux_rx,
            sink,
            metrics,
            guard,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Sender loop started");
        loop {
            let item = tokio::select! {
                item = self.mux_rx.dequeue() => item,
                _ = self.guard.wait() => {
                    // Drain whatever the producers already queued so the
                    // final flushed segment is not stranded.
                    while let Ok(item) = tokio::time::timeout(
                        std::time::Duration::from_millis(200),
                        self.mux_rx.dequeue(),
                    )
                    .await
                    {
                        match item {
                            Some(item) => {
                                if self.sink.send(item).await.is_err() {
                                    break;
                                }
                                self.metrics.items_sent.fetch_add(1, Ordering::Relaxed);
                            }
                            None => break,
                        }
                    }
                    break;
                }
            };

            let Some(item) = item else {
                tracing::info!("All producers gone; sender loop ending");
                break;
            };

            let mime = item.mime_type().to_string();
            match self.sink.send(item).await {
                Ok(()) => {
                    self.metrics.items_sent.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Forwarded {} item to session", mime);
                }
                Err(e) => {
                    // One failed send is transient; the item is skipped.
                    // A dead transport takes the whole group down.
                    self.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Failed to send {} item: {}", mime, e);
                    if matches!(e, streamchat_foundation::SessionError::Closed) {
                        self.guard.request_shutdown();
                        break;
                    }
                }
            }
        }
        tracing::info!("Sender loop stopped");
    }
}
