//! Application settings structs, defaults and TOML loading.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it overrides.  Out-of-range values are clamped by
//! [`AppConfig::sanitized`] rather than rejected.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Longest delay the slider offers.
pub const DELAY_LIMIT_MS: u32 = 1_000;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture, analysis and playback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Delay applied when the app starts, in milliseconds.
    pub initial_delay_ms: u32,
    /// Upper bound for the delay, at most [`DELAY_LIMIT_MS`].
    pub max_delay_ms: u32,
    /// Analyzer FFT size; must be a power of two.
    pub fft_size: usize,
    /// Per-stream queue between capture and playback, in milliseconds.
    pub feed_queue_ms: u32,
    /// Fixed playback volume (0.0 – 1.0).
    pub playback_volume: f32,
    /// With `false` every delay plays undelayed.
    pub delay_graph_enabled: bool,
    /// Input device name; `None` picks the first enumerated device.
    pub input_device: Option<String>,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: DELAY_LIMIT_MS,
            fft_size: crate::audio::DEFAULT_FFT_SIZE,
            feed_queue_ms: 250,
            playback_volume: crate::audio::DEFAULT_VOLUME,
            delay_graph_enabled: true,
            input_device: None,
            output_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// egui window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Level display refresh rate in Hz.
    pub refresh_hz: u32,
    /// Keep the window floating above all other windows.
    pub always_on_top: bool,
    /// Initial inner size `(width, height)` in points.
    pub window_size: (f32, f32),
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60,
            always_on_top: false,
            window_size: (420.0, 360.0),
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global hotkey binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Key that toggles monitoring (e.g. `"F9"`).
    pub toggle_key: String,
    pub enabled: bool,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            toggle_key: "F9".into(),
            enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, read from `settings.toml`.
///
/// ```rust,no_run
/// use mic_mirror::config::AppConfig;
///
/// // Returns Default when the file is missing.
/// let config = AppConfig::load().unwrap();
/// assert!(config.audio.max_delay_ms <= 1_000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub ui: UiConfig,
    pub hotkey: HotkeyConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.  A missing file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Clamp every value into its supported range.
    pub fn sanitized(mut self) -> Self {
        let audio = &mut self.audio;
        audio.max_delay_ms = audio.max_delay_ms.clamp(1, DELAY_LIMIT_MS);
        audio.initial_delay_ms = audio.initial_delay_ms.min(audio.max_delay_ms);
        if !audio.fft_size.is_power_of_two() || !(32..=32_768).contains(&audio.fft_size) {
            log::warn!(
                "config: fft_size {} unsupported, using {}",
                audio.fft_size,
                crate::audio::DEFAULT_FFT_SIZE
            );
            audio.fft_size = crate::audio::DEFAULT_FFT_SIZE;
        }
        audio.feed_queue_ms = audio.feed_queue_ms.clamp(20, 2_000);
        audio.playback_volume = if audio.playback_volume.is_finite() {
            audio.playback_volume.clamp(0.0, 1.0)
        } else {
            crate::audio::DEFAULT_VOLUME
        };

        let ui = &mut self.ui;
        ui.refresh_hz = ui.refresh_hz.clamp(1, 240);
        ui.window_size = (ui.window_size.0.max(240.0), ui.window_size.1.max(200.0));

        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
