//! Microphone capture via `cpal`.
//!
//! [`CpalBackend`] is the production [`MediaBackend`].  Every acquisition
//! opens the input device on its own thread (cpal streams are not `Send` on
//! every platform), downmixes to mono in the callback and pushes into a fresh
//! [`AudioFeed`].  The stream lives until its [`CaptureTrack`] is stopped.

use std::sync::mpsc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::monitor::{DeviceDescriptor, MediaBackend, MediaSource, MediaTrack, MonitorError, TrackKind};

use super::{stereo_to_mono, AudioFeed};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or running a capture stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("capture thread exited before the stream was ready")]
    ThreadGone,
}

impl From<CaptureError> for MonitorError {
    fn from(e: CaptureError) -> Self {
        let message = e.to_string();
        match e {
            CaptureError::NoDevice => MonitorError::DeviceNotFound("default".into()),
            CaptureError::DeviceNotFound(name) => MonitorError::DeviceNotFound(name),
            CaptureError::DefaultConfig(cpal::DefaultStreamConfigError::DeviceNotAvailable)
            | CaptureError::BuildStream(cpal::BuildStreamError::DeviceNotAvailable)
            | CaptureError::PlayStream(cpal::PlayStreamError::DeviceNotAvailable) => {
                MonitorError::DeviceNotFound(message)
            }
            _ => MonitorError::from_backend_message(message),
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureTrack
// ---------------------------------------------------------------------------

/// The running capture stream of one acquisition.
///
/// Stopping signals the stream thread, which drops the cpal stream and
/// exits; the call waits for that to happen.
pub struct CaptureTrack {
    label: String,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureTrack {
    fn new(label: String, stop_tx: mpsc::Sender<()>, thread: JoinHandle<()>) -> Self {
        Self {
            label,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }
}

/// Join a stream thread.  On a multi-threaded runtime the worker is
/// handed off first so the wait does not stall other tasks.
pub(crate) fn join_stream_thread(thread: JoinHandle<()>) -> std::thread::Result<()> {
    let on_multi_thread = tokio::runtime::Handle::try_current()
        .is_ok_and(|h| h.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread);
    if on_multi_thread {
        tokio::task::block_in_place(|| thread.join())
    } else {
        thread.join()
    }
}

impl MediaTrack for CaptureTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };
        // The thread may already be gone after a stream error.
        let _ = stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if join_stream_thread(thread).is_err() {
                log::error!("capture: stream thread for '{}' panicked", self.label);
            }
        }
        log::debug!("capture: stopped '{}'", self.label);
    }

    fn is_live(&self) -> bool {
        self.stop_tx.is_some()
    }
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// [`MediaBackend`] on the default cpal host.
///
/// Device ids are the device names reported by the host.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    /// Samples kept for the analyzer window.
    window_len: usize,
    /// Per-reader queue length in milliseconds.
    queue_ms: u32,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new(super::DEFAULT_FFT_SIZE, 250)
    }
}

impl CpalBackend {
    pub fn new(window_len: usize, queue_ms: u32) -> Self {
        Self {
            window_len: window_len.max(1),
            queue_ms: queue_ms.max(10),
        }
    }
}

#[async_trait]
impl MediaBackend for CpalBackend {
    async fn list_audio_inputs(&self) -> Result<Vec<DeviceDescriptor>, MonitorError> {
        let devices = tokio::task::spawn_blocking(enumerate_inputs)
            .await
            .map_err(|e| MonitorError::Unknown(e.to_string()))??;
        Ok(devices)
    }

    async fn acquire(&self, device_id: Option<&str>) -> Result<MediaSource, MonitorError> {
        let requested = device_id.map(str::to_owned);
        let window_len = self.window_len;
        let queue_ms = self.queue_ms;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("capture-stream".into())
            .spawn(move || {
                run_stream(requested, window_len, queue_ms, ready_tx, stop_rx);
            })
            .map_err(|e| MonitorError::Unknown(e.to_string()))?;

        let (device, feed) = ready_rx.await.map_err(|_| CaptureError::ThreadGone)??;
        log::info!(
            "capture: '{}' open at {} Hz",
            device.label,
            feed.sample_rate()
        );

        let track = CaptureTrack::new(device.label.clone(), stop_tx, thread);
        Ok(MediaSource::new(device, feed, vec![Box::new(track)]))
    }
}

fn enumerate_inputs() -> Result<Vec<DeviceDescriptor>, MonitorError> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(CaptureError::from)?;
    Ok(devices
        .filter_map(|d| d.name().ok())
        .map(|name| DeviceDescriptor::new(name.clone(), name))
        .collect())
}

fn find_input(requested: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match requested {
        None => host.default_input_device().ok_or(CaptureError::NoDevice),
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(name.to_owned())),
    }
}

type Ready = Result<(DeviceDescriptor, AudioFeed), MonitorError>;

/// Body of the stream thread: open, report, then park until stopped.
fn run_stream(
    requested: Option<String>,
    window_len: usize,
    queue_ms: u32,
    ready_tx: oneshot::Sender<Ready>,
    stop_rx: mpsc::Receiver<()>,
) {
    let opened = open_stream(requested.as_deref(), window_len, queue_ms);
    let stream = match opened {
        Ok((stream, device, feed)) => {
            if ready_tx.send(Ok((device, feed))).is_err() {
                // Acquisition was abandoned; drop the stream right away.
                return;
            }
            stream
        }
        Err(e) => {
            log::warn!("capture: {e}");
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };

    // Sender dropped counts as a stop as well.
    let _ = stop_rx.recv();
    drop(stream);
}

fn open_stream(
    requested: Option<&str>,
    window_len: usize,
    queue_ms: u32,
) -> Result<(cpal::Stream, DeviceDescriptor, AudioFeed), CaptureError> {
    let device = find_input(requested)?;
    let name = device.name().unwrap_or_else(|_| "Unknown input".into());

    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;

    let queue_len = (sample_rate as usize * queue_ms as usize / 1_000).max(1);
    let feed = AudioFeed::new(sample_rate, window_len, queue_len);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, feed.clone())?,
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, feed.clone())?,
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, feed.clone())?,
        other => return Err(CaptureError::UnsupportedFormat(other)),
    };
    stream.play()?;

    Ok((stream, DeviceDescriptor::new(name.clone(), name), feed))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    feed: AudioFeed,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|s| s.to_sample::<f32>()));
            if channels > 1 {
                feed.push(&stereo_to_mono(&scratch, channels));
            } else {
                feed.push(&scratch);
            }
        },
        |err: cpal::StreamError| {
            log::error!("capture: stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
