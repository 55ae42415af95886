use std::collections::VecDeque;

use super::capture::CaptureFrame;
use super::resampler::{ResamplerQuality, StreamResampler};
use streamchat_foundation::AudioError;

/// Converts native-format capture frames into fixed-duration mono
/// segments at the target rate.
///
/// Per frame: downmix to mono, resample to the target rate, append to
/// the accumulator. Whenever the accumulator holds a full segment's
/// worth of samples, exactly that many are drained out; the remainder
/// is carried over so no samples are lost between segments. `flush`
/// drains the partial tail on shutdown, which may be shorter than a
/// full segment.
pub struct SegmentBuilder {
    target_rate: u32,
    segment_samples: usize,
    quality: ResamplerQuality,
    resampler: Option<StreamResampler>,
    current_input_rate: Option<u32>,
    current_input_channels: Option<u16>,
    accumulator: VecDeque<i16>,
}

impl SegmentBuilder {
    pub fn new(target_rate: u32, segment_samples: usize, quality: ResamplerQuality) -> Self {
        Self {
            target_rate,
            segment_samples,
            quality,
            resampler: None,
            current_input_rate: None,
            current_input_channels: None,
            accumulator: VecDeque::with_capacity(segment_samples + segment_samples / 4),
        }
    }

    pub fn segment_samples(&self) -> usize {
        self.segment_samples
    }

    /// Feed one native-format frame. Returns zero or more complete
    /// segments of exactly `segment_samples` mono samples each.
    pub fn push_frame(&mut self, frame: &CaptureFrame) -> Result<Vec<Vec<i16>>, AudioError> {
        if self.current_input_rate != Some(frame.sample_rate)
            || self.current_input_channels != Some(frame.channels)
        {
            self.reconfigure(frame.sample_rate, frame.channels)?;
        }

        let mono = Self::downmix(&frame.samples, frame.channels);
        let converted = match &mut self.resampler {
            Some(rs) => rs.process(&mono),
            None => mono,
        };
        self.accumulator.extend(converted);

        let mut segments = Vec::new();
        while self.accumulator.len() >= self.segment_samples {
            segments.push(self.drain_segment(self.segment_samples));
        }
        Ok(segments)
    }

    /// Emit whatever is left as a final, possibly shorter, segment.
    /// Returns None when the accumulator is empty.
    pub fn flush(&mut self) -> Option<Vec<i16>> {
        if self.accumulator.is_empty() {
            return None;
        }
        let len = self.accumulator.len();
        tracing::info!("Flushing partial segment of {} samples", len);
        Some(self.drain_segment(len))
    }

    fn drain_segment(&mut self, len: usize) -> Vec<i16> {
        self.accumulator.drain(..len).collect()
    }

    /// Downmix interleaved multi-channel samples by averaging each
    /// sample group. Integer division truncates toward zero; the same
    /// input always produces the same output.
    fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
        if channels <= 1 {
            return samples.to_vec();
        }
        let channels = channels as usize;
        samples
            .chunks_exact(channels)
            .map(|group| {
                let sum: i32 = group.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    }

    fn reconfigure(&mut self, input_rate: u32, input_channels: u16) -> Result<(), AudioError> {
        if input_rate != self.target_rate {
            tracing::info!(
                "Configuring resampler: {} Hz {} ch -> {} Hz mono",
                input_rate,
                input_channels,
                self.target_rate
            );
            self.resampler = Some(StreamResampler::new(
                input_rate,
                self.target_rate,
                self.quality,
            )?);
        } else {
            tracing::info!(
                "Device already at target rate {} Hz, no resampling needed",
                input_rate
            );
            self.resampler = None;
        }

        self.current_input_rate = Some(input_rate);
        self.current_input_channels = Some(input_channels);
        Ok(())
    }
}
