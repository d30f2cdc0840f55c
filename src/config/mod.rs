//! Configuration module for mic-mirror.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem
//! and `AppPaths` for the platform config directory.  Settings are read once
//! at startup via `AppConfig::load`; the application never writes them back.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, HotkeyConfig, UiConfig};
