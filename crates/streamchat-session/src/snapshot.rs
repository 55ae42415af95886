use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::outbound::{ImageFrame, MuxSender, OutboundItem};
use streamchat_foundation::{ShutdownGuard, SnapshotError};
use streamchat_telemetry::PipelineMetrics;

/// Collaborator that produces one encoded full-screen image on demand.
#[async_trait]
pub trait ScreenSource: Send {
    async fn capture_frame(&mut self) -> Result<ImageFrame, SnapshotError>;
}

/// Shells out to the first working screenshot tool on the machine.
/// Each candidate writes PNG to stdout; the one that succeeds is
/// remembered for subsequent captures.
pub struct CommandScreenSource {
    candidates: Vec<(&'static str, Vec<&'static str>)>,
    selected: Option<usize>,
}

impl CommandScreenSource {
    pub fn new() -> Self {
        Self {
            candidates: vec![
                // Wayland
                ("grim", vec!["-"]),
                // X11
                ("maim", vec![]),
                // ImageMagick fallback
                ("import", vec!["-window", "root", "png:-"]),
            ],
            selected: None,
        }
    }

    async fn run_tool(
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, SnapshotError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| SnapshotError::Capture(format!("{}: {}", program, e)))?;
        if !output.status.success() || output.stdout.is_empty() {
            return Err(SnapshotError::Capture(format!(
                "{} exited with {}",
                program, output.status
            )));
        }
        Ok(output.stdout)
    }
}

impl Default for CommandScreenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScreenSource for CommandScreenSource {
    async fn capture_frame(&mut self) -> Result<ImageFrame, SnapshotError> {
        let order: Vec<usize> = match self.selected {
            Some(i) => vec![i],
            None => (0..self.candidates.len()).collect(),
        };

        for i in order {
            let (program, args) = &self.candidates[i];
            match Self::run_tool(program, args).await {
                Ok(bytes) => {
                    if self.selected.is_none() {
                        tracing::info!("Using screenshot tool: {}", program);
                        self.selected = Some(i);
                    }
                    return Ok(ImageFrame::new(bytes, "image/png"));
                }
                Err(e) => {
                    tracing::debug!("Screenshot candidate failed: {}", e);
                }
            }
        }
        Err(SnapshotError::NoTool)
    }
}

/// Periodic snapshot producer: one capture per interval, enqueued into
/// the multiplexer with the same blocking backpressure as the audio lane.
pub struct SnapshotLoop<S: ScreenSource> {
    source: S,
    mux_tx: MuxSender,
    interval: Duration,
    metrics: PipelineMetrics,
    guard: ShutdownGuard,
}

impl<S: ScreenSource> SnapshotLoop<S> {
    pub fn new(
        source: S,
        mux_tx: MuxSender,
        interval: Duration,
        metrics: PipelineMetrics,
        guard: ShutdownGuard,
    ) -> Self {
        Self {
            source,
            mux_tx,
            interval,
            metrics,
            guard,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Snapshot loop started ({:?} interval)", self.interval);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.guard.wait() => break,
            }

            let frame = match self.source.capture_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    // Transient: skip this tick, try again next interval.
                    tracing::warn!("Screen capture failed: {}", e);
                    continue;
                }
            };

            self.metrics.snapshots_captured.fetch_add(1, Ordering::Relaxed);
            if self.mux_tx.enqueue(OutboundItem::Image(frame)).await.is_err() {
                tracing::info!("Multiplexer closed; snapshot loop ending");
                break;
            }
            tracing::debug!("Screen snapshot enqueued");
        }
        tracing::info!("Snapshot loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Multiplexer;
    use streamchat_foundation::ShutdownHandler;

    struct FixedSource {
        captures: u32,
    }

    #[async_trait]
    impl ScreenSource for FixedSource {
        async fn capture_frame(&mut self) -> Result<ImageFrame, SnapshotError> {
            self.captures += 1;
            Ok(ImageFrame::new(vec![0x89, 0x50, 0x4E, 0x47], "image/png"))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ScreenSource for FailingSource {
        async fn capture_frame(&mut self) -> Result<ImageFrame, SnapshotError> {
            Err(SnapshotError::NoTool)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn produces_one_frame_per_interval() {
        let metrics = PipelineMetrics::default();
        let guard = ShutdownHandler::new().install().await;
        let (mux_tx, mut mux_rx) = Multiplexer::bounded(5);
        let stop = guard.clone();

        let snapshot_loop = SnapshotLoop::new(
            FixedSource { captures: 0 },
            mux_tx,
            Duration::from_secs(5),
            metrics.clone(),
            guard,
        );
        let handle = tokio::spawn(snapshot_loop.run());

        tokio::time::advance(Duration::from_secs(11)).await;
        let first = mux_rx.dequeue().await.unwrap();
        assert_eq!(first.mime_type(), "image/png");
        assert!(mux_rx.dequeue().await.is_some());

        stop.request_shutdown();
        handle.await.unwrap();
        assert!(metrics.snapshot().snapshots_captured >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_skips_tick_and_continues() {
        let metrics = PipelineMetrics::default();
        let guard = ShutdownHandler::new().install().await;
        let (mux_tx, mux_rx) = Multiplexer::bounded(5);
        let stop = guard.clone();

        let snapshot_loop = SnapshotLoop::new(
            FailingSource,
            mux_tx,
            Duration::from_secs(5),
            metrics.clone(),
            guard,
        );
        let handle = tokio::spawn(snapshot_loop.run());

        tokio::time::advance(Duration::from_secs(16)).await;
        stop.request_shutdown();
        handle.await.unwrap();

        assert_eq!(metrics.snapshot().snapshots_captured, 0);
        drop(mux_rx);
    }
}
