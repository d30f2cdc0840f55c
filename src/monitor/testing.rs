//! Test doubles for the host seams: tracks, outputs and the media backend.
//!
//! Every double reports through a cloneable probe so a test can keep
//! observing after the double itself has been boxed and handed over.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::audio::AudioFeed;

use super::{
    AudioOutput, DeviceDescriptor, MediaBackend, MediaSource, MediaTrack, MonitorError,
    PlayableStream, PlaybackError, TrackKind,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Ordered log shared between doubles, used to assert cross-object ordering.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        lock(&self.0).push(event.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }
}

// ---------------------------------------------------------------------------
// MockTrack
// ---------------------------------------------------------------------------

struct TrackProbeInner {
    label: String,
    stops: AtomicUsize,
    log: Option<EventLog>,
}

/// Observes one [`MockTrack`].
#[derive(Clone)]
pub struct TrackProbe(Arc<TrackProbeInner>);

impl TrackProbe {
    pub fn new(label: &str) -> Self {
        Self::build(label, None)
    }

    /// A probe that also writes `stop <label>` into `log`.
    pub fn with_log(label: &str, log: EventLog) -> Self {
        Self::build(label, Some(log))
    }

    fn build(label: &str, log: Option<EventLog>) -> Self {
        Self(Arc::new(TrackProbeInner {
            label: label.to_owned(),
            stops: AtomicUsize::new(0),
            log,
        }))
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn stop_count(&self) -> usize {
        self.0.stops.load(Ordering::SeqCst)
    }
}

pub struct MockTrack {
    probe: TrackProbe,
    live: bool,
}

impl MockTrack {
    pub fn new(probe: TrackProbe) -> Self {
        Self { probe, live: true }
    }
}

impl MediaTrack for MockTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        self.probe.label()
    }

    fn stop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        self.probe.0.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.probe.0.log {
            log.push(format!("stop {}", self.probe.label()));
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

// ---------------------------------------------------------------------------
// MockOutput
// ---------------------------------------------------------------------------

#[derive(Default)]
struct OutputScript {
    events: Vec<String>,
    active: usize,
    max_active: usize,
    plays: usize,
    block_next: bool,
    hang_next: bool,
}

/// Observes and scripts one [`MockOutput`].
#[derive(Clone, Default)]
pub struct OutputProbe {
    script: Arc<Mutex<OutputScript>>,
    hung: Arc<Notify>,
}

impl OutputProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams currently attached.  More than one means overlapping playback.
    pub fn active(&self) -> usize {
        lock(&self.script).active
    }

    pub fn max_active(&self) -> usize {
        lock(&self.script).max_active
    }

    /// Successful `play` calls.
    pub fn plays(&self) -> usize {
        lock(&self.script).plays
    }

    /// Calls made on the output, in order.
    pub fn events(&self) -> Vec<String> {
        lock(&self.script).events.clone()
    }

    /// Make the next `play` fail with [`PlaybackError::AutoplayBlocked`].
    pub fn block_next_play(&self) {
        lock(&self.script).block_next = true;
    }

    /// Make the next `play` attach its stream and then never complete.
    pub fn hang_next_play(&self) {
        lock(&self.script).hang_next = true;
    }

    /// Resolves once a hanging `play` has attached its stream.
    pub async fn wait_for_hang(&self) {
        self.hung.notified().await;
    }
}

pub struct MockOutput {
    probe: OutputProbe,
    attached: Vec<PlayableStream>,
    playing: bool,
}

impl MockOutput {
    pub fn new(probe: OutputProbe) -> Self {
        Self {
            probe,
            attached: Vec::new(),
            playing: false,
        }
    }

    fn sync_active(&self, script: &mut OutputScript) {
        script.active = self.attached.len();
        script.max_active = script.max_active.max(script.active);
    }
}

#[async_trait]
impl AudioOutput for MockOutput {
    async fn play(&mut self, stream: PlayableStream) -> Result<(), PlaybackError> {
        let hang = {
            let mut script = lock(&self.probe.script);
            script.events.push("play".into());
            if std::mem::take(&mut script.block_next) {
                return Err(PlaybackError::AutoplayBlocked);
            }
            self.attached.push(stream);
            self.playing = true;
            self.sync_active(&mut script);
            let hang = std::mem::take(&mut script.hang_next);
            if !hang {
                script.plays += 1;
            }
            hang
        };

        if hang {
            self.probe.hung.notify_one();
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn pause(&mut self) {
        lock(&self.probe.script).events.push("pause".into());
        self.playing = false;
    }

    fn rewind(&mut self) {
        lock(&self.probe.script).events.push("rewind".into());
    }

    fn detach(&mut self) {
        let mut script = lock(&self.probe.script);
        script.events.push("detach".into());
        self.attached.clear();
        self.playing = false;
        self.sync_active(&mut script);
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BackendScript {
    failures: VecDeque<MonitorError>,
    enumeration_failure: Option<MonitorError>,
    requested: Vec<Option<String>>,
    probes: Vec<TrackProbe>,
    feeds: Vec<AudioFeed>,
}

/// In-memory [`MediaBackend`] with a fixed device list.
///
/// Each successful acquisition yields one audio track whose probe is kept
/// for inspection.  Acquisitions and track stops are written to the shared
/// [`EventLog`] as `acquire <id>` and `stop <id>`.
pub struct MockBackend {
    devices: Vec<DeviceDescriptor>,
    sample_rate: u32,
    log: EventLog,
    script: Mutex<BackendScript>,
}

impl MockBackend {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices,
            sample_rate: 8_000,
            log: EventLog::new(),
            script: Mutex::new(BackendScript::default()),
        }
    }

    /// Two microphones, `mic-1` and `mic-2`.
    pub fn two_mics() -> Self {
        Self::new(vec![
            DeviceDescriptor::new("mic-1", "Microphone 1"),
            DeviceDescriptor::new("mic-2", "Microphone 2"),
        ])
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    /// Queue an error for the next acquisition.
    pub fn fail_next_acquire(&self, error: MonitorError) {
        lock(&self.script).failures.push_back(error);
    }

    /// Make every enumeration fail with `error`.
    pub fn fail_enumeration(&self, error: MonitorError) {
        lock(&self.script).enumeration_failure = Some(error);
    }

    /// Device ids passed to `acquire`, in call order.
    pub fn requested(&self) -> Vec<Option<String>> {
        lock(&self.script).requested.clone()
    }

    /// Probes of every track handed out so far.
    pub fn track_probes(&self) -> Vec<TrackProbe> {
        lock(&self.script).probes.clone()
    }

    /// Feeds of every source handed out so far.
    pub fn feeds(&self) -> Vec<AudioFeed> {
        lock(&self.script).feeds.clone()
    }
}

#[async_trait]
impl MediaBackend for MockBackend {
    async fn list_audio_inputs(&self) -> Result<Vec<DeviceDescriptor>, MonitorError> {
        match &lock(&self.script).enumeration_failure {
            Some(e) => Err(e.clone()),
            None => Ok(self.devices.clone()),
        }
    }

    async fn acquire(&self, device_id: Option<&str>) -> Result<MediaSource, MonitorError> {
        let mut script = lock(&self.script);
        script.requested.push(device_id.map(str::to_owned));
        self.log
            .push(format!("acquire {}", device_id.unwrap_or("default")));

        if let Some(e) = script.failures.pop_front() {
            return Err(e);
        }

        let device = match device_id {
            Some(id) => self
                .devices
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or_else(|| MonitorError::DeviceNotFound(id.to_owned()))?,
            None => self
                .devices
                .first()
                .cloned()
                .ok_or_else(|| MonitorError::DeviceNotFound("default".into()))?,
        };

        let probe = TrackProbe::with_log(&device.id, self.log.clone());
        let feed = AudioFeed::new(self.sample_rate, 256, 4_096);
        script.probes.push(probe.clone());
        script.feeds.push(feed.clone());

        Ok(MediaSource::new(
            device,
            feed,
            vec![Box::new(MockTrack::new(probe))],
        ))
    }
}
