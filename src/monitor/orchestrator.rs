//! Monitoring orchestrator: the state machine behind the enable button, the
//! delay slider and the device picker.
//!
//! [`MonitorOrchestrator`] owns every handle of the monitoring path (the
//! media source, the delay graph, playback, the analyzer attachment and the
//! refresh loop) and is the only code that mutates them.  It runs as a single
//! tokio task and handles [`MonitorCommand`]s one at a time in arrival order.
//!
//! # Flow
//!
//! ```text
//! Acquire        ─▶ enumerate, pick first device if none, acquire, attach analyzer
//! Enable         ─▶ Disabled: [acquire] → build graph → play      [Enabling → Enabled]
//!                   Enabled:  rebuild graph → restart playback    [Rebuilding → Enabled]
//! SetDelay(ms)   ─▶ Enabled:  rebuild at ms; otherwise store only
//! Disable        ─▶ stop playback → release graph                 [Disabled]
//! SwitchDevice   ─▶ full reset → acquire the new device           [Disabled]
//! teardown       ─▶ stop playback → release graph → stop tracks
//!                   → release analyzer → cancel refresh loop      [Disabled]
//! ```
//!
//! Teardown is requested through [`MonitorHandle::teardown`] rather than the
//! command queue and preempts whatever transition is in flight: the
//! transition future is dropped and teardown runs on whatever it left behind.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::audio::{AnalyzerHandle, LevelAnalyzer, LoudnessFrame};

use super::state::{lock_state, MonitorPhase, SharedState};
use super::{
    DelayGraphBuilder, GraphStats, MediaBackend, MediaSource, MonitorError, PlaybackController,
    RefreshLoop,
};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Requests handled by the orchestrator, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Run the permission flow and enumerate devices.
    Acquire,
    /// Start monitoring, or rebuild when already monitoring.
    Enable,
    Disable,
    /// Enable when disabled, disable otherwise.
    Toggle,
    /// New delay in milliseconds.
    SetDelay(u32),
    /// Hard reset onto another input device.
    SwitchDevice(String),
    RefreshDevices,
}

/// What teardown released.  Every field is `false`/`0` when teardown found
/// nothing to release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub playback_stopped: bool,
    pub graph_released: bool,
    pub tracks_stopped: usize,
    pub analyzer_released: bool,
    pub refresh_cancelled: bool,
}

// ---------------------------------------------------------------------------
// MonitorHandle / MonitorInbox
// ---------------------------------------------------------------------------

/// Sending side, held by the UI and the hotkey bridge.
#[derive(Debug)]
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    teardown: Option<oneshot::Sender<()>>,
}

/// Receiving side, consumed by [`MonitorOrchestrator::run`].
#[derive(Debug)]
pub struct MonitorInbox {
    commands: mpsc::Receiver<MonitorCommand>,
    teardown: oneshot::Receiver<()>,
}

#[cfg(test)]
impl MonitorInbox {
    /// Next queued command, if any.
    pub(crate) fn try_next(&mut self) -> Option<MonitorCommand> {
        self.commands.try_recv().ok()
    }
}

/// Create a command channel with room for `capacity` queued commands.
pub fn monitor_channel(capacity: usize) -> (MonitorHandle, MonitorInbox) {
    let (commands_tx, commands_rx) = mpsc::channel(capacity.max(1));
    let (teardown_tx, teardown_rx) = oneshot::channel();
    (
        MonitorHandle {
            commands: commands_tx,
            teardown: Some(teardown_tx),
        },
        MonitorInbox {
            commands: commands_rx,
            teardown: teardown_rx,
        },
    )
}

impl MonitorHandle {
    /// Queue a command without blocking.  Returns `false` when the queue is
    /// full or the orchestrator is gone.
    pub fn send(&self, command: MonitorCommand) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                log::warn!("monitor: command queue full, dropping {cmd:?}");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a command, waiting for room.
    pub async fn send_async(&self, command: MonitorCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Ask the orchestrator to tear down, preempting any in-flight
    /// transition.  Only the first call has an effect.
    pub fn teardown(&mut self) -> bool {
        match self.teardown.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// MonitorOrchestrator
// ---------------------------------------------------------------------------

/// Owns and sequences the monitoring path.
pub struct MonitorOrchestrator {
    state: SharedState,
    backend: Arc<dyn MediaBackend>,
    graph: DelayGraphBuilder,
    playback: PlaybackController,
    analyzer: Arc<LevelAnalyzer>,
    analyzer_handle: AnalyzerHandle,
    source: Option<MediaSource>,
    refresh: RefreshLoop,
    refresh_period: Duration,
    max_delay_ms: u32,
}

impl MonitorOrchestrator {
    /// Create an orchestrator with nothing acquired.
    ///
    /// * `state`   : shared application state (also read by the UI).
    /// * `backend` : device enumeration and acquisition.
    /// * `graph`   : delay graph builder; its maximum delay also caps
    ///   [`MonitorCommand::SetDelay`].
    /// * `playback`: controller around the audible output.
    /// * `analyzer`: level/spectrum analyzer fed from the raw stream.
    pub fn new(
        state: SharedState,
        backend: Arc<dyn MediaBackend>,
        graph: DelayGraphBuilder,
        playback: PlaybackController,
        analyzer: LevelAnalyzer,
    ) -> Self {
        let max_delay_ms = graph.max_delay_ms();
        Self {
            state,
            backend,
            graph,
            playback,
            analyzer: Arc::new(analyzer),
            analyzer_handle: AnalyzerHandle::detached(),
            source: None,
            refresh: RefreshLoop::idle(),
            refresh_period: super::period_for_hz(60),
            max_delay_ms,
        }
    }

    /// Period of the level refresh loop (default 60 Hz).
    pub fn with_refresh_period(mut self, period: Duration) -> Self {
        self.refresh_period = period;
        self
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Handle commands until teardown is requested or every sender is gone,
    /// then tear down.
    pub async fn run(mut self, inbox: MonitorInbox) -> TeardownReport {
        let MonitorInbox {
            mut commands,
            teardown,
        } = inbox;

        // A dropped handle drains the queue instead of preempting it.
        let teardown = async move {
            if teardown.await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(teardown);

        loop {
            let command = tokio::select! {
                biased;
                _ = &mut teardown => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            let preempted = {
                let transition = self.dispatch(command);
                tokio::pin!(transition);
                tokio::select! {
                    biased;
                    _ = &mut teardown => true,
                    _ = &mut transition => false,
                }
            };
            if preempted {
                log::info!("monitor: teardown preempted an in-flight transition");
                break;
            }
        }

        self.teardown()
    }

    /// Handle a single command to completion.
    ///
    /// Errors never escape: they are logged and written to the status line.
    pub async fn dispatch(&mut self, command: MonitorCommand) {
        log::debug!("monitor: {command:?} in {:?}", self.phase());
        let result = match command {
            MonitorCommand::Acquire => self.acquire(None).await,
            MonitorCommand::Enable => self.enable().await,
            MonitorCommand::Disable => {
                self.disable();
                Ok(())
            }
            MonitorCommand::Toggle => {
                if self.phase() == MonitorPhase::Enabled {
                    self.disable();
                    Ok(())
                } else {
                    self.enable().await
                }
            }
            MonitorCommand::SetDelay(delay_ms) => self.set_delay(delay_ms).await,
            MonitorCommand::SwitchDevice(device_id) => self.switch_device(device_id).await,
            MonitorCommand::RefreshDevices => {
                self.refresh_devices().await;
                Ok(())
            }
        };

        if let Err(e) = result {
            self.fail(e);
        }
    }

    /// Release everything, in order: playback, graph, source tracks,
    /// analyzer, refresh loop.  Safe to call repeatedly.
    pub fn teardown(&mut self) -> TeardownReport {
        let report = self.release_all();
        log::info!("monitor: teardown complete {report:?}");
        report
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Enumerate, settle on a device and acquire it.  A source that is
    /// already held is kept unless `device_id` names another device.
    async fn acquire(&mut self, device_id: Option<String>) -> Result<(), MonitorError> {
        self.refresh_devices().await;

        let requested = {
            let mut st = lock_state(&self.state);
            if let Some(id) = device_id {
                st.monitor.selected_device_id = id;
            } else if st.monitor.selected_device_id.is_empty() {
                if let Some(first) = st.devices.first() {
                    st.monitor.selected_device_id = first.id.clone();
                }
            }
            st.monitor.selected_device_id.clone()
        };

        if let Some(source) = &self.source {
            if source.device().id == requested {
                return Ok(());
            }
        }

        let device_id = (!requested.is_empty()).then_some(requested.as_str());
        let source = self.backend.acquire(device_id).await?;
        log::info!("monitor: acquired '{}'", source.device().label);
        self.attach(source);
        Ok(())
    }

    fn attach(&mut self, source: MediaSource) {
        self.analyzer_handle.release();
        self.refresh.cancel();

        self.analyzer_handle = self.analyzer.attach(source.feed());

        let analyzer = Arc::clone(&self.analyzer);
        let handle = self.analyzer_handle.clone();
        let state = Arc::clone(&self.state);
        self.refresh = RefreshLoop::start(self.refresh_period, move || {
            let frame = analyzer.sample_frame(&handle);
            lock_state(&state).level = frame;
        });

        {
            let mut st = lock_state(&self.state);
            st.monitor.selected_device_id = source.device().id.clone();
            st.source_active = true;
            st.status = None;
        }
        self.source = Some(source);
    }

    async fn enable(&mut self) -> Result<(), MonitorError> {
        if self.phase() == MonitorPhase::Enabled {
            let delay_ms = lock_state(&self.state).monitor.delay_ms;
            return self.rebuild(delay_ms).await;
        }

        self.set_phase(MonitorPhase::Enabling);
        if self.source.is_none() {
            self.acquire(None).await?;
        }
        let delay_ms = lock_state(&self.state).monitor.delay_ms;
        self.start_playback(delay_ms).await
    }

    /// Close the old graph, build the new one and restart playback on it.
    async fn rebuild(&mut self, delay_ms: u32) -> Result<(), MonitorError> {
        self.set_phase(MonitorPhase::Rebuilding);
        self.start_playback(delay_ms).await
    }

    async fn start_playback(&mut self, delay_ms: u32) -> Result<(), MonitorError> {
        let Some(source) = &self.source else {
            return Err(MonitorError::DeviceNotFound("no source acquired".into()));
        };
        let stream = self.graph.build(source.feed(), delay_ms);
        self.playback.start(stream).await?;

        let mut st = lock_state(&self.state);
        st.phase = MonitorPhase::Enabled;
        st.monitor.enabled = true;
        st.needs_activation = false;
        st.status = None;
        log::info!("monitor: enabled at {delay_ms} ms");
        Ok(())
    }

    fn disable(&mut self) {
        let stopped = self.playback.stop();
        let released = self.graph.release();
        if stopped || released {
            log::info!("monitor: disabled");
        }
        let mut st = lock_state(&self.state);
        st.phase = MonitorPhase::Disabled;
        st.monitor.enabled = false;
    }

    async fn set_delay(&mut self, delay_ms: u32) -> Result<(), MonitorError> {
        let delay_ms = delay_ms.min(self.max_delay_ms);
        let changed = {
            let mut st = lock_state(&self.state);
            let changed = st.monitor.delay_ms != delay_ms;
            st.monitor.delay_ms = delay_ms;
            changed
        };

        if changed && self.phase() == MonitorPhase::Enabled {
            self.rebuild(delay_ms).await
        } else {
            Ok(())
        }
    }

    async fn switch_device(&mut self, device_id: String) -> Result<(), MonitorError> {
        log::info!("monitor: switching to device '{device_id}'");
        self.release_all();
        self.acquire(Some(device_id)).await
    }

    async fn refresh_devices(&mut self) {
        match self.backend.list_audio_inputs().await {
            Ok(devices) => {
                log::debug!("monitor: {} input device(s)", devices.len());
                lock_state(&self.state).devices = devices;
            }
            Err(e) => log::warn!("monitor: device enumeration failed: {e}"),
        }
    }

    fn release_all(&mut self) -> TeardownReport {
        let report = TeardownReport {
            playback_stopped: self.playback.stop(),
            graph_released: self.graph.release(),
            tracks_stopped: self
                .source
                .take()
                .map(|mut source| source.stop_all_tracks())
                .unwrap_or(0),
            analyzer_released: self.analyzer_handle.release(),
            refresh_cancelled: self.refresh.cancel(),
        };

        let mut st = lock_state(&self.state);
        st.phase = MonitorPhase::Disabled;
        st.monitor.enabled = false;
        st.source_active = false;
        st.level = LoudnessFrame::silent(self.analyzer.bin_count());
        report
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Leave the monitoring path disabled with nothing attached and report
    /// `error` on the status line.  The acquired source is kept.
    fn fail(&mut self, error: MonitorError) {
        self.playback.stop();
        self.graph.release();

        let message = error.user_message();
        let mut st = lock_state(&self.state);
        st.phase = MonitorPhase::Disabled;
        st.monitor.enabled = false;
        st.needs_activation = error == MonitorError::AutoplayBlocked;
        st.status = Some(message);
        log::error!("monitor: {error}");
    }

    fn phase(&self) -> MonitorPhase {
        lock_state(&self.state).phase
    }

    fn set_phase(&self, phase: MonitorPhase) {
        lock_state(&self.state).phase = phase;
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.graph.stats()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_running()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::state::new_shared_state;
    use crate::monitor::testing::{MockBackend, MockOutput, OutputProbe};
    use crate::monitor::ContextRegistry;

    struct Rig {
        orc: MonitorOrchestrator,
        state: SharedState,
        backend: Arc<MockBackend>,
        output: OutputProbe,
        registry: ContextRegistry,
    }

    fn rig_with(backend: MockBackend) -> Rig {
        let state = new_shared_state(0, 128);
        let backend = Arc::new(backend);
        let output = OutputProbe::new();
        let registry = ContextRegistry::new();

        let orc = MonitorOrchestrator::new(
            Arc::clone(&state),
            Arc::clone(&backend) as Arc<dyn MediaBackend>,
            DelayGraphBuilder::with_registry(1_000, true, registry.clone()),
            PlaybackController::new(Box::new(MockOutput::new(output.clone()))),
            LevelAnalyzer::default(),
        )
        .with_refresh_period(Duration::from_millis(5));

        Rig {
            orc,
            state,
            backend,
            output,
            registry,
        }
    }

    fn rig() -> Rig {
        rig_with(MockBackend::two_mics())
    }

    fn phase(state: &SharedState) -> MonitorPhase {
        lock_state(state).phase
    }

    // -----------------------------------------------------------------------
    // Acquisition
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn acquire_selects_first_device_and_starts_refresh() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::Acquire).await;

        let st = lock_state(&r.state);
        assert_eq!(st.devices.len(), 2);
        assert_eq!(st.monitor.selected_device_id, "mic-1");
        assert!(st.source_active);
        assert_eq!(st.phase, MonitorPhase::Disabled);
        drop(st);

        assert_eq!(r.backend.requested(), vec![Some("mic-1".to_string())]);
        assert!(r.orc.is_refreshing());
    }

    #[tokio::test]
    async fn acquire_twice_keeps_the_held_source() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::Acquire).await;
        r.orc.dispatch(MonitorCommand::Acquire).await;
        assert_eq!(r.backend.requested().len(), 1);
    }

    #[tokio::test]
    async fn permission_denied_is_reported_not_fatal() {
        let mut r = rig();
        r.backend.fail_next_acquire(MonitorError::PermissionDenied);
        r.orc.dispatch(MonitorCommand::Enable).await;

        {
            let st = lock_state(&r.state);
            assert_eq!(st.phase, MonitorPhase::Disabled);
            assert!(!st.monitor.enabled);
            assert_eq!(
                st.status.as_deref(),
                Some(MonitorError::PermissionDenied.user_message().as_str())
            );
        }
        assert!(!r.orc.has_source());

        // Still accepting commands.
        r.orc.dispatch(MonitorCommand::Enable).await;
        assert_eq!(phase(&r.state), MonitorPhase::Enabled);
        assert!(lock_state(&r.state).status.is_none());
    }

    #[tokio::test]
    async fn enumeration_failure_still_acquires_default() {
        let mut r = rig();
        r.backend
            .fail_enumeration(MonitorError::Unknown("no host".into()));
        r.orc.dispatch(MonitorCommand::Acquire).await;

        assert_eq!(r.backend.requested(), vec![None]);
        assert!(r.orc.has_source());
        assert_eq!(lock_state(&r.state).monitor.selected_device_id, "mic-1");
    }

    // -----------------------------------------------------------------------
    // Enable / disable
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn enable_from_disabled_acquires_and_plays() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::Enable).await;

        let st = lock_state(&r.state);
        assert_eq!(st.phase, MonitorPhase::Enabled);
        assert!(st.monitor.enabled);
        drop(st);
        assert_eq!(r.output.active(), 1);
        // Delay 0 is passthrough: no graph.
        assert_eq!(r.registry.opened(), 0);
    }

    #[tokio::test]
    async fn enabling_twice_yields_one_playback_instance() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::Enable).await;
        r.orc.dispatch(MonitorCommand::Enable).await;

        assert_eq!(phase(&r.state), MonitorPhase::Enabled);
        assert_eq!(r.output.plays(), 2);
        assert_eq!(r.output.active(), 1);
        assert_eq!(r.output.max_active(), 1);
        assert_eq!(r.backend.requested().len(), 1);
    }

    #[tokio::test]
    async fn enabling_twice_with_delay_keeps_one_live_context() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::SetDelay(200)).await;
        r.orc.dispatch(MonitorCommand::Enable).await;
        r.orc.dispatch(MonitorCommand::Enable).await;

        assert_eq!(r.registry.live(), 1);
        assert_eq!(r.registry.opened(), 2);
        assert_eq!(r.output.max_active(), 1);
    }

    #[tokio::test]
    async fn disable_stops_playback_and_releases_graph() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::SetDelay(300)).await;
        r.orc.dispatch(MonitorCommand::Enable).await;
        assert_eq!(r.registry.live(), 1);

        r.orc.dispatch(MonitorCommand::Disable).await;
        assert_eq!(phase(&r.state), MonitorPhase::Disabled);
        assert!(!lock_state(&r.state).monitor.enabled);
        assert_eq!(r.output.active(), 0);
        assert_eq!(r.registry.live(), 0);
        // The microphone stays acquired for the level display.
        assert!(r.orc.has_source());
    }

    #[tokio::test]
    async fn toggle_flips_enabled_state() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::Toggle).await;
        assert_eq!(phase(&r.state), MonitorPhase::Enabled);
        r.orc.dispatch(MonitorCommand::Toggle).await;
        assert_eq!(phase(&r.state), MonitorPhase::Disabled);
        assert_eq!(r.output.active(), 0);
    }

    #[tokio::test]
    async fn autoplay_block_returns_to_disabled_and_asks_for_activation() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::SetDelay(300)).await;
        r.output.block_next_play();
        r.orc.dispatch(MonitorCommand::Enable).await;

        {
            let st = lock_state(&r.state);
            assert_eq!(st.phase, MonitorPhase::Disabled);
            assert!(!st.monitor.enabled);
            assert!(st.needs_activation);
            assert!(st.status.is_some());
        }
        assert_eq!(r.output.active(), 0);
        assert_eq!(r.registry.live(), 0);

        // A manual retry clears the flag.
        r.orc.dispatch(MonitorCommand::Enable).await;
        assert_eq!(phase(&r.state), MonitorPhase::Enabled);
        assert!(!lock_state(&r.state).needs_activation);
    }

    // -----------------------------------------------------------------------
    // Delay changes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delay_change_while_enabled_rebuilds_once() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::Enable).await;
        let before = r.orc.graph_stats();

        r.orc.dispatch(MonitorCommand::SetDelay(300)).await;

        assert_eq!(phase(&r.state), MonitorPhase::Enabled);
        assert_eq!(lock_state(&r.state).monitor.delay_ms, 300);
        let after = r.orc.graph_stats();
        assert_eq!(after.built - before.built, 1);
        assert_eq!(r.registry.live(), 1);
        assert_eq!(
            r.output.events(),
            vec!["play", "pause", "rewind", "detach", "play"]
        );
        assert_eq!(r.output.max_active(), 1);
    }

    #[tokio::test]
    async fn delay_change_closes_old_graph_before_building_new() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::SetDelay(100)).await;
        r.orc.dispatch(MonitorCommand::Enable).await;
        r.orc.dispatch(MonitorCommand::SetDelay(300)).await;

        assert_eq!(r.registry.opened(), 2);
        assert_eq!(r.registry.closed(), 1);
        assert_eq!(r.registry.live(), 1);
    }

    #[tokio::test]
    async fn delay_change_while_disabled_only_updates_state() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::SetDelay(450)).await;

        assert_eq!(lock_state(&r.state).monitor.delay_ms, 450);
        assert_eq!(phase(&r.state), MonitorPhase::Disabled);
        assert!(r.output.events().is_empty());
        assert_eq!(r.registry.opened(), 0);
    }

    #[tokio::test]
    async fn delay_is_capped() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::SetDelay(5_000)).await;
        assert_eq!(lock_state(&r.state).monitor.delay_ms, 1_000);
    }

    // -----------------------------------------------------------------------
    // Device switch
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn device_switch_stops_old_tracks_before_new_acquisition() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::Enable).await;
        r.orc
            .dispatch(MonitorCommand::SwitchDevice("mic-2".into()))
            .await;

        assert_eq!(
            r.backend.log().entries(),
            vec!["acquire mic-1", "stop mic-1", "acquire mic-2"]
        );
        let probes = r.backend.track_probes();
        assert_eq!(probes[0].stop_count(), 1);
        assert_eq!(probes[1].stop_count(), 0);

        let st = lock_state(&r.state);
        assert_eq!(st.phase, MonitorPhase::Disabled);
        assert_eq!(st.monitor.selected_device_id, "mic-2");
        assert!(st.source_active);
        drop(st);
        assert_eq!(r.output.active(), 0);
    }

    #[tokio::test]
    async fn failed_device_switch_leaves_nothing_dangling() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::SetDelay(300)).await;
        r.orc.dispatch(MonitorCommand::Enable).await;
        r.backend
            .fail_next_acquire(MonitorError::DeviceBusy("mic-2".into()));
        r.orc
            .dispatch(MonitorCommand::SwitchDevice("mic-2".into()))
            .await;

        let st = lock_state(&r.state);
        assert_eq!(st.phase, MonitorPhase::Disabled);
        assert!(!st.source_active);
        assert!(st.status.is_some());
        drop(st);
        assert_eq!(r.output.active(), 0);
        assert_eq!(r.registry.live(), 0);
        assert!(!r.orc.has_source());
        assert!(!r.orc.is_refreshing());
    }

    // -----------------------------------------------------------------------
    // Teardown & run loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn teardown_releases_in_order_and_only_once() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::SetDelay(300)).await;
        r.orc.dispatch(MonitorCommand::Enable).await;

        let report = r.orc.teardown();
        assert_eq!(
            report,
            TeardownReport {
                playback_stopped: true,
                graph_released: true,
                tracks_stopped: 1,
                analyzer_released: true,
                refresh_cancelled: true,
            }
        );
        assert_eq!(r.orc.teardown(), TeardownReport::default());
        assert_eq!(r.backend.track_probes()[0].stop_count(), 1);
        assert_eq!(r.registry.live(), 0);
        assert_eq!(
            lock_state(&r.state).level,
            LoudnessFrame::silent(128)
        );
    }

    #[tokio::test]
    async fn run_handles_queued_commands_in_order() {
        let r = rig();
        let (handle, inbox) = monitor_channel(8);
        assert!(handle.send(MonitorCommand::Enable));
        assert!(handle.send(MonitorCommand::SetDelay(300)));
        assert!(handle.send(MonitorCommand::Disable));
        drop(handle); // close channel so run() returns

        let report = r.orc.run(inbox).await;

        assert_eq!(lock_state(&r.state).monitor.delay_ms, 300);
        assert_eq!(phase(&r.state), MonitorPhase::Disabled);
        assert_eq!(report.tracks_stopped, 1);
        assert!(!report.playback_stopped);
        assert_eq!(r.registry.live(), 0);
        assert_eq!(r.output.max_active(), 1);
    }

    #[tokio::test]
    async fn teardown_while_rebuilding_releases_everything_once() {
        let r = rig();
        let (mut handle, inbox) = monitor_channel(8);
        let task = tokio::spawn(r.orc.run(inbox));

        assert!(handle.send_async(MonitorCommand::Enable).await);
        while phase(&r.state) != MonitorPhase::Enabled {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        r.output.hang_next_play();
        assert!(handle.send_async(MonitorCommand::SetDelay(300)).await);
        r.output.wait_for_hang().await;
        assert_eq!(phase(&r.state), MonitorPhase::Rebuilding);

        assert!(handle.teardown());
        let report = task.await.unwrap();

        assert!(report.playback_stopped);
        assert!(report.graph_released);
        assert_eq!(report.tracks_stopped, 1);
        assert!(report.analyzer_released);
        assert!(report.refresh_cancelled);
        assert_eq!(r.backend.track_probes()[0].stop_count(), 1);
        assert_eq!(r.registry.opened(), 1);
        assert_eq!(r.registry.closed(), 1);
        assert_eq!(r.output.active(), 0);
        assert_eq!(phase(&r.state), MonitorPhase::Disabled);
        assert!(!handle.teardown());
    }

    #[tokio::test]
    async fn teardown_request_stops_the_loop_with_commands_pending() {
        let r = rig();
        let (mut handle, inbox) = monitor_channel(8);
        assert!(handle.teardown());
        assert!(handle.send(MonitorCommand::Enable));

        let report = r.orc.run(inbox).await;
        assert_eq!(report, TeardownReport::default());
        assert!(r.backend.requested().is_empty());
        assert!(r.output.events().is_empty());
    }

    #[tokio::test]
    async fn passthrough_stream_is_played_when_delay_is_zero() {
        let mut r = rig();
        r.orc.dispatch(MonitorCommand::Enable).await;
        assert_eq!(r.orc.graph_stats().passthrough, 1);
        assert_eq!(r.orc.graph_stats().built, 0);
    }
}
