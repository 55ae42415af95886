pub mod capture;
pub mod device;
pub mod frame_reader;
pub mod resampler;
pub mod ring_buffer;
pub mod segmenter;
pub mod watchdog;

// Public API
pub use capture::{CaptureFrame, CaptureThread, DeviceConfig};
pub use device::DeviceManager;
pub use frame_reader::FrameReader;
pub use resampler::{ResamplerQuality, StreamResampler};
pub use ring_buffer::AudioRingBuffer;
pub use segmenter::SegmentBuilder;
pub use watchdog::WatchdogTimer;
