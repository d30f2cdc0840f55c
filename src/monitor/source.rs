//! Media sources: live capture streams and the backend that acquires them.
//!
//! A [`MediaSource`] bundles the raw [`AudioFeed`] with the tracks that keep
//! the capture hardware running.  It is owned exclusively by the
//! orchestrator; stopping it stops every track, and dropping it does the
//! same as a last resort.
//!
//! [`MediaBackend`] is the seam to the host: device enumeration and the
//! permission-granting acquisition call.  [`CpalBackend`](crate::audio::CpalBackend)
//! is the production implementation.

use async_trait::async_trait;

use crate::audio::AudioFeed;

use super::MonitorError;

// ---------------------------------------------------------------------------
// DeviceDescriptor
// ---------------------------------------------------------------------------

/// One audio input as reported by device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Stable identifier passed back to [`MediaBackend::acquire`].
    pub id: String,
    /// Human-readable label.
    pub label: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaTrack
// ---------------------------------------------------------------------------

/// Kind of a capture track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single running capture track.
pub trait MediaTrack: Send {
    fn kind(&self) -> TrackKind;

    /// Label of the device feeding this track.
    fn label(&self) -> &str;

    /// Stop the track and release its hardware.  Stopping an already
    /// stopped track is a no-op.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

// ---------------------------------------------------------------------------
// MediaSource
// ---------------------------------------------------------------------------

/// A live capture stream.
pub struct MediaSource {
    device: DeviceDescriptor,
    feed: AudioFeed,
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl MediaSource {
    pub fn new(device: DeviceDescriptor, feed: AudioFeed, tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self {
            device,
            feed,
            tracks,
        }
    }

    /// The device this source was acquired from.
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// Raw, undelayed audio.
    pub fn feed(&self) -> &AudioFeed {
        &self.feed
    }

    /// Number of tracks that have not been stopped yet.
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// Stop every live track.  Returns how many tracks were stopped by this
    /// call.
    pub fn stop_all_tracks(&mut self) -> usize {
        let mut stopped = 0;
        for track in self.tracks.iter_mut().filter(|t| t.is_live()) {
            log::debug!("source: stopping {:?} track '{}'", track.kind(), track.label());
            track.stop();
            stopped += 1;
        }
        stopped
    }
}

impl Drop for MediaSource {
    fn drop(&mut self) {
        let stopped = self.stop_all_tracks();
        if stopped > 0 {
            log::warn!("source: {stopped} track(s) still live on drop");
        }
    }
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSource")
            .field("device", &self.device)
            .field("tracks", &self.tracks.len())
            .field("live", &self.live_track_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MediaBackend
// ---------------------------------------------------------------------------

/// Host device access.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Enumerate audio inputs in host order.
    async fn list_audio_inputs(&self) -> Result<Vec<DeviceDescriptor>, MonitorError>;

    /// Open `device_id` (or the host default when `None`) and start capturing.
    ///
    /// Fails with [`MonitorError::PermissionDenied`],
    /// [`MonitorError::DeviceNotFound`], [`MonitorError::DeviceBusy`] or
    /// [`MonitorError::Unknown`].
    async fn acquire(&self, device_id: Option<&str>) -> Result<MediaSource, MonitorError>;
}

// Compile-time assertion: Box<dyn MediaBackend> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn MediaBackend>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
