//! Monitoring state machine and shared application state.
//!
//! [`MonitorPhase`] is the orchestrator's state machine.  [`AppState`] is the
//! single source of truth the UI reads every frame; the orchestrator and the
//! refresh loop are its only writers.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<AppState>>`, cloned into
//! every task that touches the state.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::LoudnessFrame;

use super::DeviceDescriptor;

// ---------------------------------------------------------------------------
// MonitorPhase
// ---------------------------------------------------------------------------

/// States of the monitoring path.
///
/// ```text
/// Disabled ──enable──▶ Enabling ──playing──▶ Enabled
///                         └──blocked / error──▶ Disabled
/// Enabled ──delay change / enable──▶ Rebuilding ──▶ Enabled
/// Enabled ──disable──▶ Disabled
/// any ──device switch / teardown──▶ Disabled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorPhase {
    #[default]
    Disabled,
    Enabling,
    Enabled,
    Rebuilding,
}

impl MonitorPhase {
    /// Returns `true` while a transition is in flight.
    ///
    /// ```
    /// use mic_mirror::monitor::MonitorPhase;
    ///
    /// assert!(!MonitorPhase::Disabled.is_transitioning());
    /// assert!(MonitorPhase::Enabling.is_transitioning());
    /// assert!(!MonitorPhase::Enabled.is_transitioning());
    /// assert!(MonitorPhase::Rebuilding.is_transitioning());
    /// ```
    pub fn is_transitioning(&self) -> bool {
        matches!(self, MonitorPhase::Enabling | MonitorPhase::Rebuilding)
    }

    /// A short human-readable label suitable for the status bar.
    pub fn label(&self) -> &'static str {
        match self {
            MonitorPhase::Disabled => "Off",
            MonitorPhase::Enabling => "Starting",
            MonitorPhase::Enabled => "Monitoring",
            MonitorPhase::Rebuilding => "Updating",
        }
    }
}

// ---------------------------------------------------------------------------
// MonitorState
// ---------------------------------------------------------------------------

/// User-controlled monitoring settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonitorState {
    /// Whether the speaker path is currently audible.
    pub enabled: bool,
    /// Playback delay in milliseconds, `0..=1000`.
    pub delay_ms: u32,
    /// Input device id; empty until one is chosen or defaulted.
    pub selected_device_id: String,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared application state.
pub struct AppState {
    pub phase: MonitorPhase,
    pub monitor: MonitorState,

    /// Audio inputs from the last enumeration, in host order.
    pub devices: Vec<DeviceDescriptor>,

    /// Whether a microphone stream is currently held.
    pub source_active: bool,

    /// Status line.  `None` when there is nothing to report.
    pub status: Option<String>,

    /// Set when playback was blocked and the user has to enable it by hand.
    pub needs_activation: bool,

    /// Latest loudness frame, written by the refresh loop.
    pub level: LoudnessFrame,
}

impl AppState {
    /// Initial state with the given starting delay and analyzer bin count.
    pub fn new(delay_ms: u32, bin_count: usize) -> Self {
        Self {
            phase: MonitorPhase::Disabled,
            monitor: MonitorState {
                delay_ms,
                ..MonitorState::default()
            },
            devices: Vec::new(),
            source_active: false,
            status: None,
            needs_activation: false,
            level: LoudnessFrame::silent(bin_count),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(0, crate::audio::DEFAULT_FFT_SIZE / 2)
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`AppState`].
///
/// Lock with [`lock_state`] for a short critical section; do **not** hold the
/// lock across `.await` points.
pub type SharedState = Arc<Mutex<AppState>>;

/// Construct a new [`SharedState`].
pub fn new_shared_state(delay_ms: u32, bin_count: usize) -> SharedState {
    Arc::new(Mutex::new(AppState::new(delay_ms, bin_count)))
}

/// Lock the shared state, recovering from a poisoned lock.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
