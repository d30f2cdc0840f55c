//! Playback of the monitoring stream.
//!
//! [`PlaybackController`] owns the single [`AudioOutput`] and guarantees that
//! at most one stream is ever attached to it: [`start`](PlaybackController::start)
//! always runs the full stop sequence (pause, rewind, detach) before the new
//! stream goes in.

use async_trait::async_trait;
use thiserror::Error;

use super::{MonitorError, PlayableStream};

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Why playback could not start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// The platform refused to start audio without a user gesture (or
    /// otherwise declined to run the output).  Recoverable by retrying from
    /// an explicit user action.
    #[error("playback start was blocked by the platform")]
    AutoplayBlocked,

    /// The output could not be constructed at all.
    #[error("output unavailable: {0}")]
    Output(String),
}

impl From<PlaybackError> for MonitorError {
    fn from(e: PlaybackError) -> Self {
        match e {
            PlaybackError::AutoplayBlocked => MonitorError::AutoplayBlocked,
            PlaybackError::Output(msg) => MonitorError::Unknown(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioOutput
// ---------------------------------------------------------------------------

/// The audible output element.
///
/// Mirrors a media element: a source is attached and played, and can be
/// paused, rewound and detached independently.
#[async_trait]
pub trait AudioOutput: Send {
    /// Attach `stream` and start playing it.
    async fn play(&mut self, stream: PlayableStream) -> Result<(), PlaybackError>;

    /// Stop producing sound.  No-op when already paused.
    fn pause(&mut self);

    /// Reset the playback position to the start.
    fn rewind(&mut self);

    /// Drop the attached stream, if any.
    fn detach(&mut self);

    /// Whether a stream is attached and playing.
    fn is_playing(&self) -> bool;
}

// ---------------------------------------------------------------------------
// PlaybackController
// ---------------------------------------------------------------------------

/// Proof that playback started; returned by [`PlaybackController::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enabled;

/// Sequences the single output.
pub struct PlaybackController {
    output: Box<dyn AudioOutput>,
    enabled: bool,
    starts: usize,
}

impl PlaybackController {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            enabled: false,
            starts: 0,
        }
    }

    /// Stop whatever is playing, then attach and play `stream`.
    ///
    /// On failure the controller is left stopped with `enabled == false`.
    pub async fn start(&mut self, stream: PlayableStream) -> Result<Enabled, PlaybackError> {
        self.stop();

        log::debug!("playback: starting {:?}", stream.kind());
        match self.output.play(stream).await {
            Ok(()) => {
                self.enabled = true;
                self.starts += 1;
                Ok(Enabled)
            }
            Err(e) => {
                log::warn!("playback: start failed: {e}");
                // Never leave a half-attached stream behind.
                self.output.detach();
                self.enabled = false;
                Err(e)
            }
        }
    }

    /// Pause, rewind and detach.  Returns `false` when nothing was playing.
    pub fn stop(&mut self) -> bool {
        if !self.enabled && !self.output.is_playing() {
            return false;
        }
        self.output.pause();
        self.output.rewind();
        self.output.detach();
        self.enabled = false;
        log::debug!("playback: stopped");
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Successful starts so far.
    pub fn start_count(&self) -> usize {
        self.starts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
