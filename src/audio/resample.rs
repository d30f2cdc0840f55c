//! Channel mixing and sample-rate conversion.
//!
//! 1. [`stereo_to_mono`]: downmix interleaved capture buffers to mono before
//!    they enter the [`AudioFeed`](super::AudioFeed).
//! 2. [`StreamResampler`]: a streaming linear-interpolation resampler that
//!    wraps any [`SampleSource`], used when the output device cannot run at
//!    the capture rate.

use super::SampleSource;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use mic_mirror::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Streaming linear-interpolation resampler.
///
/// Pulls input from the wrapped source in blocks and carries the fractional
/// read position (and the samples it still needs) across calls, so
/// consecutive `fill` calls produce a continuous signal.
pub struct StreamResampler {
    inner: Box<dyn SampleSource>,
    /// Input samples advanced per output sample (`from_rate / to_rate`).
    step: f64,
    /// Read position relative to `pending[0]`.
    pos: f64,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Wrap `inner`, converting from `from_rate` Hz to `to_rate` Hz.
    ///
    /// A zero rate on either side is treated as "no conversion".
    pub fn new(inner: Box<dyn SampleSource>, from_rate: u32, to_rate: u32) -> Self {
        let step = if from_rate == 0 || to_rate == 0 {
            1.0
        } else {
            from_rate as f64 / to_rate as f64
        };
        Self {
            inner,
            step,
            pos: 0.0,
            pending: Vec::new(),
        }
    }
}

impl SampleSource for StreamResampler {
    fn fill(&mut self, out: &mut [f32]) {
        if out.is_empty() {
            return;
        }

        // Enough input for the last output sample and its right neighbour.
        let required = (self.pos + out.len() as f64 * self.step).ceil() as usize + 2;
        if required > self.pending.len() {
            let start = self.pending.len();
            self.pending.resize(required, 0.0);
            self.inner.fill(&mut self.pending[start..]);
        }

        for slot in out.iter_mut() {
            let i = self.pos as usize;
            let frac = (self.pos - i as f64) as f32;
            let a = self.pending[i];
            let b = self.pending[i + 1];
            *slot = a + (b - a) * frac;
            self.pos += self.step;
        }

        let consumed = (self.pos as usize).min(self.pending.len());
        self.pending.drain(..consumed);
        self.pos -= consumed as f64;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
