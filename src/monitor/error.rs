//! Error taxonomy of the monitoring subsystem.
//!
//! Every acquisition and playback failure is converted into a
//! [`MonitorError`] at the orchestrator boundary and from there into the
//! status line shown to the user ([`MonitorError::user_message`]).  None of
//! them are fatal: the orchestrator always returns to `Disabled` and keeps
//! accepting commands.

use thiserror::Error;

/// Failure of a monitoring operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// The user or the operating system refused microphone access.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The requested (or default) input device does not exist.
    #[error("input device not found: {0}")]
    DeviceNotFound(String),

    /// The device exists but another client holds it exclusively.
    #[error("input device busy: {0}")]
    DeviceBusy(String),

    /// The platform refused to start playback without user activation.
    #[error("playback start was blocked")]
    AutoplayBlocked,

    /// No audio processing graph could be built; delay is unavailable.
    #[error("audio graph unavailable: {0}")]
    GraphBuildUnavailable(String),

    /// Anything else reported by the audio backend.
    #[error("audio error: {0}")]
    Unknown(String),
}

impl MonitorError {
    /// Status line text for the UI.
    pub fn user_message(&self) -> String {
        match self {
            MonitorError::PermissionDenied => {
                "Microphone access was denied. Allow access and try again.".into()
            }
            MonitorError::DeviceNotFound(_) => "No microphone was found.".into(),
            MonitorError::DeviceBusy(_) => {
                "The microphone is in use by another application.".into()
            }
            MonitorError::AutoplayBlocked => {
                "Playback was blocked. Press Enable to start monitoring manually.".into()
            }
            MonitorError::GraphBuildUnavailable(_) => {
                "Delay is unavailable; monitoring without delay.".into()
            }
            MonitorError::Unknown(msg) => format!("Could not start audio: {msg}"),
        }
    }

    /// Classify a free-form backend message.
    ///
    /// Host audio layers report permission and exclusivity problems only as
    /// backend-specific text, so the message is matched on keywords.
    pub fn from_backend_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
        {
            MonitorError::PermissionDenied
        } else if lower.contains("busy") || lower.contains("in use") || lower.contains("exclusive") {
            MonitorError::DeviceBusy(message)
        } else if lower.contains("no such device") || lower.contains("not found") {
            MonitorError::DeviceNotFound(message)
        } else {
            MonitorError::Unknown(message)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
