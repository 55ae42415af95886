use std::time::Instant;

use super::capture::CaptureFrame;
use super::ring_buffer::AudioConsumer;

/// Drains the ring buffer into native-format frames, reconstructing
/// timestamps from the running sample count.
pub struct FrameReader {
    consumer: AudioConsumer,
    sample_rate: u32,
    channels: u16,
    samples_read: u64,
    start_time: Instant,
}

impl FrameReader {
    pub fn new(consumer: AudioConsumer, sample_rate: u32, channels: u16) -> Self {
        Self {
            consumer,
            sample_rate,
            channels,
            samples_read: 0,
            start_time: Instant::now(),
        }
    }

    /// Pick up a new native format after a capture restart landed on a
    /// different device.
    pub fn update_device_config(&mut self, sample_rate: u32, channels: u16) {
        if self.sample_rate != sample_rate || self.channels != channels {
            tracing::info!(
                "Frame reader reconfigured: {} Hz {} ch -> {} Hz {} ch",
                self.sample_rate,
                self.channels,
                sample_rate,
                channels
            );
            self.sample_rate = sample_rate;
            self.channels = channels;
        }
    }

    /// Read the next frame, up to `max_samples` interleaved samples.
    /// Returns None when the ring buffer is empty.
    pub fn read_frame(&mut self, max_samples: usize) -> Option<CaptureFrame> {
        let mut buffer = vec![0i16; max_samples];
        let samples_read = self.consumer.read(&mut buffer);

        if samples_read == 0 {
            return None;
        }

        buffer.truncate(samples_read);

        let frames = self.samples_read / self.channels.max(1) as u64;
        let elapsed_ms = (frames * 1000) / self.sample_rate as u64;
        let timestamp = self.start_time + std::time::Duration::from_millis(elapsed_ms);

        self.samples_read += samples_read as u64;

        Some(CaptureFrame {
            samples: buffer,
            timestamp,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    pub fn available_samples(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::AudioRingBuffer;

    #[test]
    fn empty_buffer_yields_none() {
        let rb = AudioRingBuffer::new(64);
        let (_prod, cons) = rb.split();
        let mut reader = FrameReader::new(cons, 48_000, 2);
        assert!(reader.read_frame(32).is_none());
    }

    #[test]
    fn frame_carries_native_format() {
        let rb = AudioRingBuffer::new(64);
        let (mut prod, cons) = rb.split();
        prod.write(&[5i16; 8]).unwrap();

        let mut reader = FrameReader::new(cons, 44_100, 2);
        let frame = reader.read_frame(32).expect("frame available");
        assert_eq!(frame.samples, vec![5i16; 8]);
        assert_eq!(frame.sample_rate, 44_100);
        assert_eq!(frame.channels, 2);
    }
}
