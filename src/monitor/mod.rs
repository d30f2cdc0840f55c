//! Audio monitoring subsystem: microphone → optional delay → speakers, with a
//! level/spectrum display fed from the raw stream.
//!
//! # Architecture
//!
//! ```text
//! MonitorHandle ──MonitorCommand (mpsc)──▶ MonitorOrchestrator::run()  ← tokio task
//!       │                                        │
//!       └──teardown (oneshot, preempts)──────────┤
//!                                                ├─ MediaBackend::acquire  → MediaSource
//!                                                ├─ DelayGraphBuilder      → PlayableStream
//!                                                ├─ PlaybackController     → AudioOutput
//!                                                └─ LevelAnalyzer + RefreshLoop
//!                                                        │
//! SharedState (Arc<Mutex<AppState>>) ◀───────────────────┘  read by egui update() each frame
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mic_mirror::audio::{CpalBackend, CpalOutput, LevelAnalyzer};
//! use mic_mirror::monitor::{
//!     monitor_channel, new_shared_state, DelayGraphBuilder, MonitorCommand,
//!     MonitorOrchestrator, PlaybackController,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let analyzer = LevelAnalyzer::default();
//!     let state = new_shared_state(0, analyzer.bin_count());
//!     let orchestrator = MonitorOrchestrator::new(
//!         state.clone(),
//!         Arc::new(CpalBackend::default()),
//!         DelayGraphBuilder::new(1_000),
//!         PlaybackController::new(Box::new(CpalOutput::default())),
//!         analyzer,
//!     );
//!
//!     let (mut handle, inbox) = monitor_channel(16);
//!     let task = tokio::spawn(orchestrator.run(inbox));
//!
//!     handle.send(MonitorCommand::Acquire);
//!     handle.send(MonitorCommand::Enable);
//!     // ...
//!     handle.teardown();
//!     let _report = task.await;
//! }
//! ```

pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod playback;
pub mod refresh;
pub mod source;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use error::MonitorError;
pub use graph::{
    AudioContext, AudioGraph, ContextRegistry, DelayGraphBuilder, GraphStats, PlayableStream,
    StreamKind,
};
pub use orchestrator::{
    monitor_channel, MonitorCommand, MonitorHandle, MonitorInbox, MonitorOrchestrator,
    TeardownReport,
};
pub use playback::{AudioOutput, Enabled, PlaybackController, PlaybackError};
pub use refresh::{period_for_hz, RefreshLoop};
pub use source::{DeviceDescriptor, MediaBackend, MediaSource, MediaTrack, TrackKind};
pub use state::{lock_state, new_shared_state, AppState, MonitorPhase, MonitorState, SharedState};
