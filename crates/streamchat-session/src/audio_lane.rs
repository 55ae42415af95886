use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::outbound::{AudioSegment, MuxSender, OutboundItem};
use streamchat_audio::capture::DeviceConfig;
use streamchat_audio::{FrameReader, SegmentBuilder};
use streamchat_foundation::ShutdownGuard;
use streamchat_telemetry::PipelineMetrics;

/// How many interleaved samples to pull off the ring buffer per read.
const READ_CHUNK_SAMPLES: usize = 4096;

/// Audio producer lane: ring buffer frames -> segment builder -> the
/// bounded multiplexer. Enqueueing a finished segment blocks while the
/// queue is full, which paces capture draining to the session's speed.
pub struct AudioLane {
    frame_reader: FrameReader,
    builder: SegmentBuilder,
    mux_tx: MuxSender,
    device_cfg_rx: broadcast::Receiver<DeviceConfig>,
    target_rate: u32,
    metrics: PipelineMetrics,
    guard: ShutdownGuard,
}

impl AudioLane {
    pub fn new(
        frame_reader: FrameReader,
        builder: SegmentBuilder,
        mux_tx: MuxSender,
        device_cfg_rx: broadcast::Receiver<DeviceConfig>,
        target_rate: u32,
        metrics: PipelineMetrics,
        guard: ShutdownGuard,
    ) -> Self {
        Self {
            frame_reader,
            builder,
            mux_tx,
            device_cfg_rx,
            target_rate,
            metrics,
            guard,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Audio lane started");

        while !self.guard.is_shutdown_requested() {
            // Pick up native-format changes from capture restarts.
            while let Ok(cfg) = self.device_cfg_rx.try_recv() {
                self.frame_reader
                    .update_device_config(cfg.sample_rate, cfg.channels);
            }

            let Some(frame) = self.frame_reader.read_frame(READ_CHUNK_SAMPLES) else {
                // Nothing buffered; 25ms keeps us ahead of device reads
                // without busy-polling.
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(25)) => {}
                    _ = self.guard.wait() => break,
                }
                continue;
            };

            let segments = match self.builder.push_frame(&frame) {
                Ok(segments) => segments,
                Err(e) => {
                    tracing::error!("Segment builder error: {}", e);
                    continue;
                }
            };

            for samples in segments {
                if !self.emit(samples).await {
                    return;
                }
            }
        }

        // Shutdown path: emit the partial accumulator so trailing audio
        // is not lost. The tail may be shorter than a full segment.
        if let Some(tail) = self.builder.flush() {
            let _ = self.emit(tail).await;
        }
        tracing::info!("Audio lane stopped");
    }

    async fn emit(&mut self, samples: Vec<i16>) -> bool {
        self.metrics
            .samples_resampled
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
        let segment = AudioSegment::from_samples(&samples, self.target_rate);
        match self.mux_tx.enqueue(OutboundItem::Audio(segment)).await {
            Ok(()) => {
                self.metrics.mark_segment_emitted();
                true
            }
            Err(_) => {
                tracing::info!("Multiplexer closed; audio lane ending");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Multiplexer;
    use streamchat_audio::{AudioRingBuffer, ResamplerQuality};
    use streamchat_foundation::ShutdownHandler;

    #[tokio::test]
    async fn segments_flow_from_ring_buffer_to_multiplexer() {
        let rb = AudioRingBuffer::new(65_536);
        let (mut prod, cons) = rb.split();
        // 16k mono passthrough, 1000-sample segments.
        let reader = FrameReader::new(cons, 16_000, 1);
        let builder = SegmentBuilder::new(16_000, 1_000, ResamplerQuality::Balanced);

        let metrics = PipelineMetrics::default();
        let guard = ShutdownHandler::new().install().await;
        let stop = guard.clone();
        let (mux_tx, mut mux_rx) = Multiplexer::bounded(5);
        let (cfg_tx, cfg_rx) = broadcast::channel(4);

        // 2500 samples: two full segments now, 500-sample tail on shutdown.
        prod.write(&vec![9i16; 2_500]).unwrap();

        let lane = AudioLane::new(reader, builder, mux_tx, cfg_rx, 16_000, metrics.clone(), guard);
        let handle = tokio::spawn(lane.run());

        let first = mux_rx.dequeue().await.unwrap();
        let second = mux_rx.dequeue().await.unwrap();
        for item in [&first, &second] {
            match item {
                OutboundItem::Audio(seg) => assert_eq!(seg.sample_count(), 1_000),
                other => panic!("unexpected item: {:?}", other),
            }
        }

        stop.request_shutdown();
        let tail = mux_rx.dequeue().await.unwrap();
        match tail {
            OutboundItem::Audio(seg) => assert_eq!(seg.sample_count(), 500),
            other => panic!("unexpected item: {:?}", other),
        }

        handle.await.unwrap();
        assert_eq!(metrics.snapshot().segments_emitted, 3);
        drop(cfg_tx);
    }
}
