//! Audio plumbing: capture → feed → {analyzer, delay graph} → output.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → stereo_to_mono → AudioFeed ─┬─▶ LevelAnalyzer (window)
//!                                                          └─▶ FeedReader → [DelayLine] → CpalOutput
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use mic_mirror::audio::{AudioFeed, LevelAnalyzer};
//!
//! let feed = AudioFeed::new(48_000, 256, 12_000);
//! let analyzer = LevelAnalyzer::default();
//! let handle = analyzer.attach(&feed);
//!
//! feed.push(&[0.0; 256]);
//! let frame = analyzer.sample_frame(&handle);
//! assert_eq!(frame.frequency_bins.len(), 128);
//! ```

pub mod analyzer;
pub mod buffer;
pub mod capture;
pub mod delay;
pub mod feed;
pub mod output;
pub mod resample;

pub use analyzer::{AnalyzerHandle, LevelAnalyzer, LoudnessFrame, DEFAULT_FFT_SIZE};
pub use buffer::RingBuffer;
pub use capture::{CaptureError, CaptureTrack, CpalBackend};
pub use delay::{samples_for_millis, DelayLine};
pub use feed::{AudioFeed, FeedReader, SampleSource, READER_MAX_LAG_MS};
pub use output::{CpalOutput, DEFAULT_VOLUME};
pub use resample::{stereo_to_mono, StreamResampler};
