use std::time::Duration;

/// Pipeline-wide tunables, shared by the audio, session, and actuation
/// layers. Defaults match the capture/session settings the original
/// deployment ran with.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Canonical sample rate of everything sent to the session (Hz).
    /// Segments are always downmixed to mono.
    pub target_sample_rate: u32,
    /// Duration of one emitted audio segment.
    pub segment_duration: Duration,
    /// Period of the screen snapshot producer.
    pub snapshot_interval: Duration,
    /// Bounded multiplexer capacity. Small on purpose: a slow session
    /// shows up as producer backpressure, not memory growth.
    pub queue_capacity: usize,
    /// Minimum relevancy (0-100) a decision must carry to be dispatched.
    pub relevancy_threshold: u8,
    /// Minimum gap between two accepted chat messages.
    pub cooldown: Duration,
    /// Preferred capture device name, if any.
    pub device: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            segment_duration: Duration::from_secs(5),
            snapshot_interval: Duration::from_secs(5),
            queue_capacity: 5,
            relevancy_threshold: 80,
            cooldown: Duration::from_secs(20),
            device: None,
        }
    }
}

impl PipelineConfig {
    /// Samples per full audio segment at the target rate.
    pub fn segment_samples(&self) -> usize {
        (self.segment_duration.as_secs_f64() * self.target_sample_rate as f64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_segment_is_five_seconds_of_16k() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.segment_samples(), 80_000);
    }
}
