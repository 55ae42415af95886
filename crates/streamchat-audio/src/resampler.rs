use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use streamchat_foundation::AudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplerQuality {
    Fast,     // Shorter sinc filter, lower CPU usage
    Balanced, // Default quality/performance balance
    Quality,  // Longer filter, higher CPU usage
}

/// Streaming band-limited resampler for mono i16 audio, wrapping
/// Rubato's sinc interpolation. Naive decimation would alias; the sinc
/// filter's cutoff sits below Nyquist of the output rate.
///
/// Input chunks may be any size; the resampler buffers internally to
/// satisfy Rubato's fixed input-chunk requirement, so output length per
/// call varies while the cumulative ratio converges on
/// out_rate / in_rate.
pub struct StreamResampler {
    in_rate: u32,
    out_rate: u32,
    resampler: SincFixedIn<f32>,
    input_buffer: Vec<f32>,
    output_buffer: Vec<f32>,
    chunk_size: usize,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32, quality: ResamplerQuality) -> Result<Self, AudioError> {
        // 512 input samples keeps latency well under one device read.
        let chunk_size = 512;

        let sinc_params = match quality {
            ResamplerQuality::Fast => SincInterpolationParameters {
                sinc_len: 32,
                f_cutoff: 0.92,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 64,
                window: WindowFunction::Blackman,
            },
            ResamplerQuality::Balanced => SincInterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 128,
                window: WindowFunction::Blackman2,
            },
            ResamplerQuality::Quality => SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.97,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
        };

        let resampler = SincFixedIn::<f32>::new(
            out_rate as f64 / in_rate as f64,
            2.0,
            sinc_params,
            chunk_size,
            1, // mono
        )
        .map_err(|e| AudioError::Fatal(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            in_rate,
            out_rate,
            resampler,
            input_buffer: Vec::with_capacity(chunk_size * 2),
            output_buffer: Vec::new(),
            chunk_size,
        })
    }

    /// Process an arbitrary chunk of mono i16 samples, returning the
    /// resampled i16 samples available so far.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if self.in_rate == self.out_rate {
            return input.to_vec();
        }

        for &sample in input {
            self.input_buffer.push(sample as f32 / 32768.0);
        }

        while self.input_buffer.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.input_buffer.drain(..self.chunk_size).collect();
            let input_frames = vec![chunk];

            let output_frames = match self.resampler.process(&input_frames, None) {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::error!("Resampler error: {}", e);
                    return Vec::new();
                }
            };

            if !output_frames.is_empty() && !output_frames[0].is_empty() {
                self.output_buffer.extend_from_slice(&output_frames[0]);
            }
        }

        let result: Vec<i16> = self
            .output_buffer
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .collect();
        self.output_buffer.clear();
        result
    }

    pub fn input_rate(&self) -> u32 {
        self.in_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.out_rate
    }
}
