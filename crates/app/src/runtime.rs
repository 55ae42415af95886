use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use streamchat_actuation::{
    wait_until_available, ChatActuator, DecisionFilter, EnigoActuator, FilterLoop, NoopActuator,
};
use streamchat_audio::{AudioRingBuffer, CaptureThread, FrameReader, ResamplerQuality, SegmentBuilder};
use streamchat_foundation::{PipelineConfig, ShutdownGuard, ShutdownHandler};
use streamchat_session::{
    AudioLane, CommandScreenSource, LiveSession, Multiplexer, ReceiverLoop, SenderLoop,
    SessionSink, SnapshotLoop,
};
use streamchat_telemetry::PipelineMetrics;

/// Interleaved i16 capacity of the capture ring buffer. Roughly 340ms
/// of 48kHz stereo, far more than the audio lane ever lets accumulate.
const RING_BUFFER_SAMPLES: usize = 16384 * 4;

/// Capacity of the completed-turns channel between the receiver loop
/// and the filter loop.
const TURNS_CHANNEL_CAPACITY: usize = 16;

/// How often to re-probe the chat surface before entering steady state.
const CHAT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Everything `start` needs beyond the pipeline tunables.
pub struct RuntimeOptions {
    pub config: PipelineConfig,
    pub session_url: String,
    pub model: String,
    pub system_prompt: String,
    pub resampler_quality: ResamplerQuality,
    pub dry_run: bool,
}

/// Handles to the running pipeline. Dropping this does not stop
/// anything; call `shutdown` for an orderly stop.
pub struct AppHandle {
    guard: ShutdownGuard,
    metrics: PipelineMetrics,
    capture: Option<CaptureThread>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl AppHandle {
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn guard(&self) -> &ShutdownGuard {
        &self.guard
    }

    /// Orderly teardown: stop the audio source first so the lanes can
    /// flush, then wait for every task to observe the shutdown signal.
    pub async fn shutdown(mut self) {
        tracing::info!("Beginning graceful shutdown");
        self.guard.request_shutdown();

        if let Some(capture) = self.capture.take() {
            capture.stop();
            tracing::info!("Capture thread stopped");
        }

        for (name, handle) in self.tasks {
            match tokio::time::timeout(Duration::from_secs(3), handle).await {
                Ok(_) => tracing::debug!("{} task finished", name),
                Err(_) => tracing::warn!("{} task did not stop in time", name),
            }
        }
        tracing::info!("Shutdown complete");
    }
}

/// Wire up and start the whole pipeline: capture, audio lane, snapshot
/// lane, session sender/receiver, and the decision filter.
pub async fn start(opts: RuntimeOptions) -> anyhow::Result<AppHandle> {
    let cfg = opts.config;
    let metrics = PipelineMetrics::default();
    let guard = ShutdownHandler::new().install().await;
    let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    // --- Chat surface ---
    // Nothing is captured or sent until messages have somewhere to go.
    let actuator: Box<dyn ChatActuator> = if opts.dry_run {
        tracing::info!("Dry run: chat messages will be logged, not typed");
        Box::new(NoopActuator)
    } else {
        let actuator = EnigoActuator::new();
        tracing::info!("Waiting for the chat surface to become available");
        if !wait_until_available(&actuator, CHAT_POLL_INTERVAL, &guard).await {
            anyhow::bail!("shutdown requested while waiting for the chat surface");
        }
        tracing::info!("Chat surface available");
        Box::new(actuator)
    };

    // --- Audio capture ---
    let ring_buffer = AudioRingBuffer::new(RING_BUFFER_SAMPLES);
    let (audio_producer, audio_consumer) = ring_buffer.split();
    let (capture, device_cfg, device_cfg_rx) = CaptureThread::spawn(
        audio_producer,
        cfg.device.clone(),
        metrics.clone(),
        guard.clone(),
    )
    .context("failed to start audio capture")?;
    tracing::info!(
        "Capturing at {} Hz, {} channel(s)",
        device_cfg.sample_rate,
        device_cfg.channels
    );

    // --- Session transport ---
    let (mut sink, stream) = LiveSession::connect(&opts.session_url, &opts.model)
        .await
        .context("failed to open session")?;
    sink.send_text(&opts.system_prompt)
        .await
        .context("failed to send system message")?;

    // --- Outbound multiplexer and its producers ---
    let (mux_tx, mux_rx) = Multiplexer::bounded(cfg.queue_capacity);

    let frame_reader = FrameReader::new(audio_consumer, device_cfg.sample_rate, device_cfg.channels);
    let builder = SegmentBuilder::new(
        cfg.target_sample_rate,
        cfg.segment_samples(),
        opts.resampler_quality,
    );
    let audio_lane = AudioLane::new(
        frame_reader,
        builder,
        mux_tx.clone(),
        device_cfg_rx,
        cfg.target_sample_rate,
        metrics.clone(),
        guard.clone(),
    );
    tasks.push(("audio-lane", tokio::spawn(audio_lane.run())));

    let snapshot_loop = SnapshotLoop::new(
        CommandScreenSource::new(),
        mux_tx,
        cfg.snapshot_interval,
        metrics.clone(),
        guard.clone(),
    );
    tasks.push(("snapshot", tokio::spawn(snapshot_loop.run())));

    // --- Session drain and reply handling ---
    let sender_loop = SenderLoop::new(mux_rx, sink, metrics.clone(), guard.clone());
    tasks.push(("sender", tokio::spawn(sender_loop.run())));

    let (turns_tx, turns_rx) = mpsc::channel(TURNS_CHANNEL_CAPACITY);
    let receiver_loop = ReceiverLoop::new(stream, turns_tx, metrics.clone(), guard.clone());
    tasks.push(("receiver", tokio::spawn(receiver_loop.run())));

    // --- Decision filter and actuation ---
    let filter = DecisionFilter::new(cfg.relevancy_threshold, cfg.cooldown);
    let filter_loop = FilterLoop::new(turns_rx, filter, actuator, metrics.clone(), guard.clone());
    tasks.push(("filter", tokio::spawn(filter_loop.run())));

    tracing::info!("Pipeline running");
    Ok(AppHandle {
        guard,
        metrics,
        capture: Some(capture),
        tasks,
    })
}
