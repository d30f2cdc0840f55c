//! Loudness and spectrum analysis of the raw (undelayed) microphone feed.
//!
//! [`LevelAnalyzer::attach`] binds an [`AnalyzerHandle`] to an
//! [`AudioFeed`]; [`LevelAnalyzer::sample_frame`] is then polled once per
//! display refresh and returns a [`LoudnessFrame`] computed from the newest
//! `fft_size` samples.  Sampling only reads the feed's window, so calling it
//! twice without new audio yields the same frame.
//!
//! Bin magnitudes follow the familiar byte-spectrum convention: a
//! Blackman-windowed FFT, magnitude normalised by the transform size,
//! converted to decibels and mapped linearly from
//! [`MIN_DECIBELS`]..[`MAX_DECIBELS`] onto `0..=255`.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard};

use realfft::{RealFftPlanner, RealToComplex};

use super::AudioFeed;

/// Default transform size (128 bins).
pub const DEFAULT_FFT_SIZE: usize = 256;
/// Level mapped to bin value 0.
pub const MIN_DECIBELS: f32 = -100.0;
/// Level mapped to bin value 255.
pub const MAX_DECIBELS: f32 = -30.0;

// ---------------------------------------------------------------------------
// LoudnessFrame
// ---------------------------------------------------------------------------

/// One snapshot of input level and frequency distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessFrame {
    /// Mean of `frequency_bins` divided by 255, in `[0.0, 1.0]`.
    pub average_level: f32,
    /// Magnitudes from DC upwards, each in `0..=255`.
    pub frequency_bins: Vec<u8>,
}

impl LoudnessFrame {
    /// An all-zero frame with `bin_count` bins.
    pub fn silent(bin_count: usize) -> Self {
        Self {
            average_level: 0.0,
            frequency_bins: vec![0; bin_count],
        }
    }

    fn from_bins(frequency_bins: Vec<u8>) -> Self {
        let average_level = if frequency_bins.is_empty() {
            0.0
        } else {
            let sum: u32 = frequency_bins.iter().map(|&b| b as u32).sum();
            sum as f32 / frequency_bins.len() as f32 / 255.0
        };
        Self {
            average_level,
            frequency_bins,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalyzerHandle
// ---------------------------------------------------------------------------

/// Binding between the analyzer and one audio feed.
///
/// Clones share the binding, so releasing one clone detaches them all; the
/// refresh loop keeps a clone and simply starts seeing silent frames once the
/// owner releases it.
#[derive(Clone, Default)]
pub struct AnalyzerHandle {
    feed: Arc<Mutex<Option<AudioFeed>>>,
}

impl AnalyzerHandle {
    /// A handle bound to nothing; sampling it yields silent frames.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Whether a feed is currently bound.
    pub fn is_attached(&self) -> bool {
        self.slot().is_some()
    }

    /// Drop the feed binding.  Returns `false` if it was already released.
    pub fn release(&self) -> bool {
        self.slot().take().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<AudioFeed>> {
        self.feed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for AnalyzerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// LevelAnalyzer
// ---------------------------------------------------------------------------

/// Fixed-resolution spectrum analyzer.
pub struct LevelAnalyzer {
    fft_size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
}

impl LevelAnalyzer {
    /// Create an analyzer with the given transform size.
    ///
    /// Sizes that are not a power of two, or smaller than 32, fall back to
    /// [`DEFAULT_FFT_SIZE`].
    pub fn new(fft_size: usize) -> Self {
        let fft_size = if fft_size >= 32 && fft_size.is_power_of_two() {
            fft_size
        } else {
            log::warn!("analyzer: unsupported fft size {fft_size}, using {DEFAULT_FFT_SIZE}");
            DEFAULT_FFT_SIZE
        };

        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let window = (0..fft_size).map(|i| blackman(i, fft_size)).collect();

        Self {
            fft_size,
            plan,
            window,
        }
    }

    /// Transform size in samples.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins in every frame (`fft_size / 2`).
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Bind a new handle to `feed`.
    pub fn attach(&self, feed: &AudioFeed) -> AnalyzerHandle {
        log::debug!("analyzer: attached to {} Hz feed", feed.sample_rate());
        AnalyzerHandle {
            feed: Arc::new(Mutex::new(Some(feed.clone()))),
        }
    }

    /// Compute the current frame for `handle`.
    ///
    /// Returns [`LoudnessFrame::silent`] when the handle is not attached.
    pub fn sample_frame(&self, handle: &AnalyzerHandle) -> LoudnessFrame {
        let mut input = self.plan.make_input_vec();
        {
            let slot = handle.slot();
            let Some(feed) = slot.as_ref() else {
                return LoudnessFrame::silent(self.bin_count());
            };
            feed.copy_window(&mut input);
        }

        for (sample, w) in input.iter_mut().zip(&self.window) {
            *sample *= w;
        }

        let mut spectrum = self.plan.make_output_vec();
        if let Err(e) = self.plan.process(&mut input, &mut spectrum) {
            log::error!("analyzer: fft failed: {e}");
            return LoudnessFrame::silent(self.bin_count());
        }

        let scale = 1.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        let bins = spectrum
            .iter()
            .take(self.bin_count())
            .map(|c| {
                let magnitude = c.norm() * scale;
                if magnitude <= 0.0 {
                    return 0;
                }
                let db = 20.0 * magnitude.log10();
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
            })
            .collect();

        LoudnessFrame::from_bins(bins)
    }
}

impl std::fmt::Debug for LevelAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelAnalyzer")
            .field("fft_size", &self.fft_size)
            .finish_non_exhaustive()
    }
}

impl Default for LevelAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

fn blackman(index: usize, len: usize) -> f32 {
    let x = index as f32 / len as f32;
    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
