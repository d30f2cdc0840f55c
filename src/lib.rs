//! Mic Mirror: hear your own microphone through the speakers with an
//! adjustable delay, next to a live level and spectrum display.
//!
//! * [`audio`]  : capture, sample fan-out, analysis, delay and output.
//! * [`monitor`]: the monitoring state machine and its resource handles.
//! * [`config`] : read-only TOML settings.
//! * [`hotkey`] : global toggle hotkey.
//! * [`app`]    : the egui window.

pub mod app;
pub mod audio;
pub mod config;
pub mod hotkey;
pub mod monitor;
