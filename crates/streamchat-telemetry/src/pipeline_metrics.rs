use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared counters for cross-task pipeline monitoring. Every field is
/// an Arc'd atomic so the struct can be cloned into each loop without
/// locks on the hot path.
#[derive(Clone)]
pub struct PipelineMetrics {
    // Capture stage
    pub frames_captured: Arc<AtomicU64>,
    pub frames_dropped: Arc<AtomicU64>,
    pub capture_restarts: Arc<AtomicU64>,

    // Segmenter stage
    pub segments_emitted: Arc<AtomicU64>,
    pub samples_resampled: Arc<AtomicU64>,

    // Multiplexer / session stage
    pub snapshots_captured: Arc<AtomicU64>,
    pub items_sent: Arc<AtomicU64>,
    pub send_failures: Arc<AtomicU64>,

    // Receiver / filter stage
    pub turns_completed: Arc<AtomicU64>,
    pub decisions_dispatched: Arc<AtomicU64>,
    pub skipped_low_relevancy: Arc<AtomicU64>,
    pub skipped_cooldown: Arc<AtomicU64>,
    pub parse_failures: Arc<AtomicU64>,
    pub actuation_failures: Arc<AtomicU64>,

    pub last_segment_time: Arc<RwLock<Option<Instant>>>,
    pub last_dispatch_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            frames_captured: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            capture_restarts: Arc::new(AtomicU64::new(0)),
            segments_emitted: Arc::new(AtomicU64::new(0)),
            samples_resampled: Arc::new(AtomicU64::new(0)),
            snapshots_captured: Arc::new(AtomicU64::new(0)),
            items_sent: Arc::new(AtomicU64::new(0)),
            send_failures: Arc::new(AtomicU64::new(0)),
            turns_completed: Arc::new(AtomicU64::new(0)),
            decisions_dispatched: Arc::new(AtomicU64::new(0)),
            skipped_low_relevancy: Arc::new(AtomicU64::new(0)),
            skipped_cooldown: Arc::new(AtomicU64::new(0)),
            parse_failures: Arc::new(AtomicU64::new(0)),
            actuation_failures: Arc::new(AtomicU64::new(0)),
            last_segment_time: Arc::new(RwLock::new(None)),
            last_dispatch_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn mark_segment_emitted(&self) {
        self.segments_emitted.fetch_add(1, Ordering::Relaxed);
        *self.last_segment_time.write() = Some(Instant::now());
    }

    pub fn mark_dispatch(&self) {
        self.decisions_dispatched.fetch_add(1, Ordering::Relaxed);
        *self.last_dispatch_time.write() = Some(Instant::now());
    }

    /// Point-in-time copy for the periodic stats log line.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            segments_emitted: self.segments_emitted.load(Ordering::Relaxed),
            snapshots_captured: self.snapshots_captured.load(Ordering::Relaxed),
            items_sent: self.items_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            turns_completed: self.turns_completed.load(Ordering::Relaxed),
            decisions_dispatched: self.decisions_dispatched.load(Ordering::Relaxed),
            skipped_low_relevancy: self.skipped_low_relevancy.load(Ordering::Relaxed),
            skipped_cooldown: self.skipped_cooldown.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            actuation_failures: self.actuation_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub segments_emitted: u64,
    pub snapshots_captured: u64,
    pub items_sent: u64,
    pub send_failures: u64,
    pub turns_completed: u64,
    pub decisions_dispatched: u64,
    pub skipped_low_relevancy: u64,
    pub skipped_cooldown: u64,
    pub parse_failures: u64,
    pub actuation_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let metrics = PipelineMetrics::default();
        let peer = metrics.clone();
        peer.items_sent.fetch_add(3, Ordering::Relaxed);
        metrics.mark_segment_emitted();

        let snap = metrics.snapshot();
        assert_eq!(snap.items_sent, 3);
        assert_eq!(snap.segments_emitted, 1);
        assert!(metrics.last_segment_time.read().is_some());
    }
}
