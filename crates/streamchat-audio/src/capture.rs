use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::device::DeviceManager;
use super::ring_buffer::AudioProducer;
use super::watchdog::WatchdogTimer;
use streamchat_foundation::{AudioError, ShutdownGuard};
use streamchat_telemetry::PipelineMetrics;

/// Consecutive restart rounds (full candidate walks) before capture is
/// declared dead and group shutdown is requested.
const MAX_RESTART_ROUNDS: u32 = 10;

/// Native format of the device the stream is currently bound to.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

/// One interleaved frame as pulled off the ring buffer, still in the
/// device's native rate and channel layout.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub samples: Vec<i16>,
    pub timestamp: Instant,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Handle to the dedicated audio capture thread.
pub struct CaptureThread {
    pub handle: JoinHandle<()>,
    pub shutdown: Arc<AtomicBool>,
}

impl CaptureThread {
    /// Spawn the capture thread, walking loopback candidates until one
    /// actually produces frames. Failure to open any device is fatal.
    pub fn spawn(
        audio_producer: AudioProducer,
        device_name: Option<String>,
        metrics: PipelineMetrics,
        guard: ShutdownGuard,
    ) -> Result<
        (
            Self,
            DeviceConfig,
            tokio::sync::broadcast::Receiver<DeviceConfig>,
        ),
        AudioError,
    > {
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = running.clone();
        let device_config = Arc::new(RwLock::new(None::<DeviceConfig>));
        let device_config_clone = device_config.clone();

        let (config_tx, config_rx) = tokio::sync::broadcast::channel(16);
        let config_tx_clone = config_tx.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let mut capture =
                    match LoopbackCapture::new(audio_producer, metrics, config_tx_clone) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::error!("Failed to create loopback capture: {}", e);
                        guard.request_shutdown();
                        return;
                    }
                };

                // Preflight: requested device first, then loopback candidates,
                // finally let the host decide.
                let mut attempts: Vec<Option<String>> = Vec::new();
                if let Some(d) = device_name.clone() {
                    attempts.push(Some(d));
                }
                for name in capture.device_manager.candidate_device_names() {
                    attempts.push(Some(name));
                }
                attempts.push(None);

                let mut dev_cfg: Option<DeviceConfig> = None;
                for attempt in attempts.clone() {
                    match capture.start(attempt.as_deref()) {
                        Ok(cfg) => {
                            tracing::info!("Audio stream started on device: {:?}", attempt);
                            if capture.wait_for_frames(Duration::from_secs(3)) {
                                dev_cfg = Some(cfg);
                                break;
                            }
                            tracing::warn!(
                                "No audio frames within preflight timeout; trying next candidate"
                            );
                            capture.stop();
                            thread::sleep(Duration::from_millis(200));
                        }
                        Err(e) => {
                            tracing::warn!("Failed to start on {:?}: {}", attempt, e);
                        }
                    }
                }
                let Some(dev_cfg) = dev_cfg else {
                    tracing::error!("All device candidates failed to produce audio");
                    guard.request_shutdown();
                    return;
                };

                *device_config_clone.write() = Some(dev_cfg);

                // Steady state: watch for watchdog or stream-error restarts.
                let mut failed_rounds = 0u32;
                while running.load(Ordering::SeqCst) && !guard.is_shutdown_requested() {
                    if capture.watchdog.is_triggered()
                        || capture.restart_needed.load(Ordering::SeqCst)
                    {
                        tracing::warn!("Capture restart triggered (watchdog or stream error)");
                        capture.stop();
                        capture.restart_needed.store(false, Ordering::SeqCst);
                        capture.metrics.capture_restarts.fetch_add(1, Ordering::Relaxed);

                        if capture.restart_any(&attempts, &device_config_clone) {
                            failed_rounds = 0;
                        } else {
                            failed_rounds += 1;
                            tracing::error!(
                                "Failed to restart capture on any candidate (round {}/{})",
                                failed_rounds,
                                MAX_RESTART_ROUNDS
                            );
                            if failed_rounds >= MAX_RESTART_ROUNDS {
                                tracing::error!("Capture is unrecoverable; requesting shutdown");
                                guard.request_shutdown();
                                break;
                            }
                            thread::sleep(Duration::from_secs(1));
                        }
                    }
                    thread::sleep(Duration::from_millis(100));
                }

                tracing::info!("Audio capture thread shutting down");
                capture.stop();
            })
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn audio thread: {}", e)))?;

        // Wait for the thread to publish the negotiated device config.
        let start = Instant::now();
        let mut cfg = None;
        while start.elapsed() < Duration::from_secs(15) {
            if let Some(config) = device_config.read().clone() {
                cfg = Some(config);
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }

        let cfg = cfg.ok_or_else(|| {
            AudioError::Fatal("Failed to get device configuration within timeout".to_string())
        })?;

        Ok((Self { handle, shutdown }, cfg, config_rx))
    }

    pub fn stop(self) {
        self.shutdown.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

struct LoopbackCapture {
    device_manager: DeviceManager,
    stream: Option<Stream>,
    audio_producer: Arc<Mutex<AudioProducer>>,
    watchdog: WatchdogTimer,
    metrics: PipelineMetrics,
    // True only while a stream is bound; gates the data callbacks and
    // the watchdog thread, independent of the capture thread lifetime.
    stream_active: Arc<AtomicBool>,
    restart_needed: Arc<AtomicBool>,
    config_tx: tokio::sync::broadcast::Sender<DeviceConfig>,
}

impl LoopbackCapture {
    fn new(
        audio_producer: AudioProducer,
        metrics: PipelineMetrics,
        config_tx: tokio::sync::broadcast::Sender<DeviceConfig>,
    ) -> Result<Self, AudioError> {
        Ok(Self {
            device_manager: DeviceManager::new()?,
            stream: None,
            audio_producer: Arc::new(Mutex::new(audio_producer)),
            watchdog: WatchdogTimer::new(Duration::from_secs(5)),
            metrics,
            stream_active: Arc::new(AtomicBool::new(false)),
            restart_needed: Arc::new(AtomicBool::new(false)),
            config_tx,
        })
    }

    fn start(&mut self, device_name: Option<&str>) -> Result<DeviceConfig, AudioError> {
        let device = self.device_manager.open_device(device_name)?;
        if let Ok(n) = device.name() {
            tracing::info!(
                "Selected loopback device: {} (host: {:?})",
                n,
                self.device_manager.host_id()
            );
        }
        let (config, sample_format) = self.negotiate_config(&device)?;

        let device_config = DeviceConfig {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };
        tracing::info!(
            "Native format: {} Hz, {} ch, {:?}",
            device_config.sample_rate,
            device_config.channels,
            sample_format
        );

        let _ = self.config_tx.send(device_config.clone());

        let stream = self.build_stream(device, config, sample_format)?;
        self.stream_active.store(true, Ordering::SeqCst);
        stream.play()?;

        self.stream = Some(stream);
        self.watchdog.start(Arc::clone(&self.stream_active));
        Ok(device_config)
    }

    fn wait_for_frames(&self, timeout: Duration) -> bool {
        let baseline = self.metrics.frames_captured.load(Ordering::Relaxed);
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.metrics.frames_captured.load(Ordering::Relaxed) > baseline {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        false
    }

    fn restart_any(
        &mut self,
        attempts: &[Option<String>],
        device_config: &Arc<RwLock<Option<DeviceConfig>>>,
    ) -> bool {
        for attempt in attempts {
            match self.start(attempt.as_deref()) {
                Ok(cfg) => {
                    tracing::info!("Capture restarted on device: {:?}", attempt);
                    *device_config.write() = Some(cfg);
                    return true;
                }
                Err(e) => {
                    tracing::warn!("Restart failed on {:?}: {}", attempt, e);
                }
            }
        }
        false
    }

    fn build_stream(
        &mut self,
        device: cpal::Device,
        config: StreamConfig,
        sample_format: SampleFormat,
    ) -> Result<Stream, AudioError> {
        let audio_producer = Arc::clone(&self.audio_producer);
        let metrics = self.metrics.clone();
        let watchdog = self.watchdog.clone();
        let stream_active = Arc::clone(&self.stream_active);
        let restart_needed = Arc::clone(&self.restart_needed);

        let err_fn = move |err: cpal::StreamError| {
            tracing::error!("Audio stream error: {}", err);
            restart_needed.store(true, Ordering::SeqCst);
        };

        // Common handler once data is i16. A full ring buffer means the
        // segmenter is behind; the frame is dropped and counted, never
        // blocked on.
        let handle_i16 = move |i16_data: &[i16]| {
            if !stream_active.load(Ordering::SeqCst) {
                return;
            }
            watchdog.feed();
            match audio_producer.lock().write(i16_data) {
                Ok(written) if written == i16_data.len() => {
                    metrics.frames_captured.fetch_add(1, Ordering::Relaxed);
                }
                _ => {
                    metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &_| {
                    handle_i16(data);
                },
                err_fn,
                None,
            )?,
            SampleFormat::F32 => {
                let mut converted: Vec<i16> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &_| {
                        converted.clear();
                        converted.reserve(data.len());
                        // Clamp [-1.0, 1.0] and scale to i16
                        for &s in data {
                            let clamped = s.clamp(-1.0, 1.0);
                            converted.push((clamped * 32767.0).round() as i16);
                        }
                        handle_i16(&converted);
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let mut converted: Vec<i16> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &_| {
                        converted.clear();
                        converted.reserve(data.len());
                        // Center unsigned [0,65535] onto [-32768,32767]
                        for &s in data {
                            converted.push((s as i32 - 32768) as i16);
                        }
                        handle_i16(&converted);
                    },
                    err_fn,
                    None,
                )?
            }
            other => {
                return Err(AudioError::FormatNotSupported {
                    format: format!("{:?}", other),
                });
            }
        };

        Ok(stream)
    }

    fn negotiate_config(
        &self,
        device: &cpal::Device,
    ) -> Result<(StreamConfig, SampleFormat), AudioError> {
        // The device's default config carries its native rate and channel
        // count; never assume they match the pipeline target.
        if let Ok(default_config) = device.default_input_config() {
            return Ok((
                StreamConfig {
                    channels: default_config.channels(),
                    sample_rate: default_config.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                },
                default_config.sample_format(),
            ));
        }

        if let Ok(configs) = device.supported_input_configs() {
            if let Some(config) = configs.into_iter().next() {
                return Ok((config.with_max_sample_rate().into(), config.sample_format()));
            }
        }

        Err(AudioError::FormatNotSupported {
            format: "No supported audio formats".to_string(),
        })
    }

    fn stop(&mut self) {
        self.stream_active.store(false, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.watchdog.stop();
    }
}

#[cfg(test)]
mod convert_tests {
    // Sample format conversions used by the capture callbacks.

    #[test]
    fn f32_to_i16_basic() {
        let src = [-1.0f32, -0.5, 0.0, 0.5, 1.0];
        let expected = [-32767i16, -16384, 0, 16384, 32767];
        let out: Vec<i16> = src
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .collect();
        assert_eq!(&out[..], &expected);
    }

    #[test]
    fn u16_to_i16_centering() {
        let src = [0u16, 32768, 65535];
        let expected = [-32768i16, 0, 32767];
        let out: Vec<i16> = src.iter().map(|&s| (s as i32 - 32768) as i16).collect();
        assert_eq!(&out[..], &expected);
    }
}
