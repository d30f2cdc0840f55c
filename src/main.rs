//! Application entry point for Mic Mirror.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults when missing).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the monitoring components from config and spawn the
//!    orchestrator; queue the initial `Acquire`.
//! 5. Spawn the hotkey listener thread.
//! 6. Run [`eframe::run_native`] until the window is closed.
//! 7. Wait for the orchestrator to finish tearing down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use eframe::egui;
use tokio::sync::mpsc;

use mic_mirror::{
    app::MirrorApp,
    audio::{CpalBackend, CpalOutput, LevelAnalyzer},
    config::AppConfig,
    hotkey::{parse_key, HotkeyEvent, HotkeyListener},
    monitor::{
        lock_state, monitor_channel, new_shared_state, period_for_hz, ContextRegistry,
        DelayGraphBuilder, MonitorCommand, MonitorOrchestrator, PlaybackController,
    },
};

/// How long to wait for teardown after the window closes.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(3);

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (w, h) = config.ui.window_size;
    let mut vp = egui::ViewportBuilder::default()
        .with_title("Mic Mirror")
        .with_inner_size([w, h])
        .with_min_inner_size([240.0, 200.0]);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

fn start_hotkey(config: &AppConfig, tx: mpsc::Sender<HotkeyEvent>) -> Option<HotkeyListener> {
    if !config.hotkey.enabled {
        return None;
    }
    let key = parse_key(&config.hotkey.toggle_key).unwrap_or_else(|| {
        log::warn!(
            "unknown hotkey '{}'; using F9",
            config.hotkey.toggle_key
        );
        rdev::Key::F9
    });
    match HotkeyListener::start(key, tx) {
        Ok(listener) => Some(listener),
        Err(e) => {
            log::warn!("hotkey listener unavailable: {e}");
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Mic Mirror starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });
    log::debug!("config: {config:?}");

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Monitoring
    let analyzer = LevelAnalyzer::new(config.audio.fft_size);
    let state = new_shared_state(config.audio.initial_delay_ms, analyzer.bin_count());
    if let Some(device) = &config.audio.input_device {
        lock_state(&state).monitor.selected_device_id = device.clone();
    }

    let orchestrator = MonitorOrchestrator::new(
        Arc::clone(&state),
        Arc::new(CpalBackend::new(
            config.audio.fft_size,
            config.audio.feed_queue_ms,
        )),
        DelayGraphBuilder::with_registry(
            config.audio.max_delay_ms,
            config.audio.delay_graph_enabled,
            ContextRegistry::new(),
        ),
        PlaybackController::new(Box::new(CpalOutput::new(
            config.audio.output_device.clone(),
            config.audio.playback_volume,
        ))),
        analyzer,
    )
    .with_refresh_period(period_for_hz(config.ui.refresh_hz));

    let (monitor, inbox) = monitor_channel(16);
    let orchestrator_task = rt.spawn(orchestrator.run(inbox));
    monitor.send(MonitorCommand::Acquire);

    // 5. Hotkey listener thread
    let (hotkey_tx, hotkey_rx) = mpsc::channel::<HotkeyEvent>(16);
    let _hotkey_listener = start_hotkey(&config, hotkey_tx);

    // 6. UI (blocks until the window is closed)
    let app = MirrorApp::new(Arc::clone(&state), monitor, hotkey_rx, &config);
    let ui_result = eframe::run_native(
        "Mic Mirror",
        native_options(&config),
        Box::new(move |_cc| Ok(Box::new(app))),
    );

    // 7. Teardown was requested by the app on exit (or by dropping its handle).
    match rt.block_on(tokio::time::timeout(TEARDOWN_TIMEOUT, orchestrator_task)) {
        Ok(Ok(report)) => log::info!("shutdown complete: {report:?}"),
        Ok(Err(e)) => log::error!("orchestrator task failed: {e}"),
        Err(_) => log::warn!("teardown did not finish within {TEARDOWN_TIMEOUT:?}"),
    }

    ui_result.map_err(|e| anyhow::anyhow!("UI error: {e}"))
}
