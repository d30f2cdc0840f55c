//! Speaker output via `cpal`.
//!
//! [`CpalOutput`] is the production [`AudioOutput`].  Each `play` opens the
//! output device on a dedicated thread, preferring the stream's own sample
//! rate and falling back to the device default plus a [`StreamResampler`].
//! The mono stream is written to every channel at a fixed volume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tokio::sync::oneshot;

use crate::monitor::{AudioOutput, PlayableStream, PlaybackError};

use super::capture::join_stream_thread;
use super::{SampleSource, StreamResampler};

/// Default playback volume.
pub const DEFAULT_VOLUME: f32 = 0.8;

// ---------------------------------------------------------------------------
// Mixing
// ---------------------------------------------------------------------------

/// Scale `mono` by `volume`, clamp to `[-1, 1]` and copy each sample into
/// every channel of the interleaved `out`.
pub fn write_interleaved<T>(mono: &[f32], volume: f32, channels: usize, out: &mut [T])
where
    T: SizedSample + FromSample<f32>,
{
    for (frame, &s) in out.chunks_mut(channels.max(1)).zip(mono) {
        let v = T::from_sample((s * volume).clamp(-1.0, 1.0));
        frame.fill(v);
    }
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

struct RunningStream {
    paused: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// [`AudioOutput`] on a cpal output device.
pub struct CpalOutput {
    /// Output device name; `None` selects the host default.
    device_name: Option<String>,
    volume: f32,
    running: Option<RunningStream>,
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new(None, DEFAULT_VOLUME)
    }
}

impl CpalOutput {
    pub fn new(device_name: Option<String>, volume: f32) -> Self {
        Self {
            device_name,
            volume: volume.clamp(0.0, 1.0),
            running: None,
        }
    }
}

#[async_trait]
impl AudioOutput for CpalOutput {
    async fn play(&mut self, stream: PlayableStream) -> Result<(), PlaybackError> {
        self.detach();

        let device_name = self.device_name.clone();
        let volume = self.volume;
        let paused = Arc::new(AtomicBool::new(false));
        let paused_cb = Arc::clone(&paused);

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("playback-stream".into())
            .spawn(move || {
                let stream = match open_output(device_name.as_deref(), stream, volume, paused_cb) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| PlaybackError::Output(e.to_string()))?;

        let ready = ready_rx
            .await
            .map_err(|_| PlaybackError::Output("playback thread exited".into()))?;
        match ready {
            Ok(()) => {
                self.running = Some(RunningStream {
                    paused,
                    stop_tx,
                    thread,
                });
                Ok(())
            }
            Err(e) => {
                let _ = join_stream_thread(thread);
                Err(e)
            }
        }
    }

    fn pause(&mut self) {
        if let Some(running) = &self.running {
            running.paused.store(true, Ordering::SeqCst);
        }
    }

    fn rewind(&mut self) {
        // A live stream has no position to reset.
    }

    fn detach(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop_tx.send(());
        if join_stream_thread(running.thread).is_err() {
            log::error!("playback: output thread panicked");
        }
        log::debug!("playback: output closed");
    }

    fn is_playing(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.paused.load(Ordering::SeqCst))
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.detach();
    }
}

fn find_output(name: Option<&str>) -> Result<cpal::Device, PlaybackError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Output("no output device".into())),
        Some(name) => host
            .output_devices()
            .map_err(|e| PlaybackError::Output(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| PlaybackError::Output(format!("output device '{name}' not found"))),
    }
}

/// A config at `rate` if the device supports it, otherwise the default.
fn choose_config(
    device: &cpal::Device,
    rate: u32,
) -> Result<cpal::SupportedStreamConfig, PlaybackError> {
    let exact = device.supported_output_configs().ok().and_then(|mut configs| {
        configs.find(|c| {
            c.min_sample_rate().0 <= rate
                && rate <= c.max_sample_rate().0
                && matches!(
                    c.sample_format(),
                    cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
                )
        })
    });
    match exact {
        Some(range) => Ok(range.with_sample_rate(cpal::SampleRate(rate))),
        None => device
            .default_output_config()
            .map_err(|e| PlaybackError::Output(e.to_string())),
    }
}

fn open_output(
    device_name: Option<&str>,
    stream: PlayableStream,
    volume: f32,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, PlaybackError> {
    let device = find_output(device_name)?;
    let supported = choose_config(&device, stream.sample_rate())?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream_rate = stream.sample_rate();
    let device_rate = config.sample_rate.0;
    let source: Box<dyn SampleSource> = if stream_rate == device_rate || stream_rate == 0 {
        stream.into_source()
    } else {
        log::debug!("playback: resampling {stream_rate} Hz -> {device_rate} Hz");
        Box::new(StreamResampler::new(
            stream.into_source(),
            stream_rate,
            device_rate,
        ))
    };

    let out = match sample_format {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, source, volume, paused)?,
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, source, volume, paused)?,
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, source, volume, paused)?,
        other => {
            return Err(PlaybackError::Output(format!(
                "unsupported sample format {other:?}"
            )))
        }
    };

    // The host refused to run the stream; retrying from a user action may
    // succeed.
    out.play().map_err(|e| {
        log::warn!("playback: start refused: {e}");
        PlaybackError::AutoplayBlocked
    })?;
    Ok(out)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut source: Box<dyn SampleSource>,
    volume: f32,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if paused.load(Ordering::Relaxed) {
                    data.fill(T::EQUILIBRIUM);
                    return;
                }
                mono.resize(data.len() / channels.max(1), 0.0);
                source.fill(&mut mono);
                write_interleaved(&mono, volume, channels, data);
            },
            |err: cpal::StreamError| {
                log::error!("playback: stream error: {err}");
            },
            None,
        )
        .map_err(|e| PlaybackError::Output(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
