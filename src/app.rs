//! Mic Mirror window built on egui/eframe.
//!
//! # Architecture
//!
//! [`MirrorApp`] is the top-level [`eframe::App`].  It never touches audio
//! handles itself; it only:
//!
//! * reads [`SharedState`] once per frame (phase, devices, level frame);
//! * sends [`MonitorCommand`]s through the [`MonitorHandle`];
//! * drains hotkey events and turns them into `Toggle` commands.
//!
//! On exit it requests orchestrator teardown; `main` waits for it.
//!
//! | Phase | Button | Accent |
//! |-------|--------|--------|
//! | `Disabled` | "Enable monitoring" | gray |
//! | `Enabling` / `Rebuilding` | disabled | blue |
//! | `Enabled` | "Disable monitoring" | green |

use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::audio::LoudnessFrame;
use crate::config::AppConfig;
use crate::hotkey::HotkeyEvent;
use crate::monitor::{
    lock_state, period_for_hz, DeviceDescriptor, MonitorCommand, MonitorHandle, MonitorPhase,
    SharedState,
};

// ---------------------------------------------------------------------------
// Frame snapshot
// ---------------------------------------------------------------------------

/// Copy of the shared state taken at the start of a frame so the lock is
/// never held while drawing.
struct Snapshot {
    phase: MonitorPhase,
    delay_ms: u32,
    selected_device_id: String,
    devices: Vec<DeviceDescriptor>,
    status: Option<String>,
    needs_activation: bool,
    source_active: bool,
    level: LoudnessFrame,
}

impl Snapshot {
    fn take(state: &SharedState) -> Self {
        let st = lock_state(state);
        Self {
            phase: st.phase,
            delay_ms: st.monitor.delay_ms,
            selected_device_id: st.monitor.selected_device_id.clone(),
            devices: st.devices.clone(),
            status: st.status.clone(),
            needs_activation: st.needs_activation,
            source_active: st.source_active,
            level: st.level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// MirrorApp
// ---------------------------------------------------------------------------

/// eframe application for the monitoring window.
pub struct MirrorApp {
    state: SharedState,
    monitor: MonitorHandle,
    hotkey_rx: mpsc::Receiver<HotkeyEvent>,

    /// Slider value; follows the shared state except while being edited.
    delay_ms: u32,
    /// Delay sent but not yet reflected in the shared state.
    pending_delay: Option<u32>,
    /// Latest command refused by a full queue; retried every frame and
    /// replaced by anything newer.
    deferred: Option<MonitorCommand>,

    repaint_every: Duration,
    max_delay_ms: u32,
    hotkey_hint: Option<String>,
}

impl MirrorApp {
    pub fn new(
        state: SharedState,
        monitor: MonitorHandle,
        hotkey_rx: mpsc::Receiver<HotkeyEvent>,
        config: &AppConfig,
    ) -> Self {
        let delay_ms = lock_state(&state).monitor.delay_ms;
        Self {
            state,
            monitor,
            hotkey_rx,
            delay_ms,
            pending_delay: None,
            deferred: None,
            repaint_every: period_for_hz(config.ui.refresh_hz),
            max_delay_ms: config.audio.max_delay_ms,
            hotkey_hint: config
                .hotkey
                .enabled
                .then(|| config.hotkey.toggle_key.clone()),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────

    /// Send `command`, or keep it as the deferred command when the queue
    /// refuses it.
    fn submit(&mut self, command: MonitorCommand) -> bool {
        if self.monitor.send(command.clone()) {
            self.deferred = None;
            return true;
        }
        self.deferred = Some(command);
        false
    }

    fn request_delay(&mut self, delay_ms: u32) {
        if self.submit(MonitorCommand::SetDelay(delay_ms)) {
            self.pending_delay = Some(delay_ms);
        }
    }

    fn retry_deferred(&mut self) {
        if let Some(command) = self.deferred.take() {
            if let MonitorCommand::SetDelay(delay_ms) = command {
                self.request_delay(delay_ms);
            } else {
                self.submit(command);
            }
        }
    }

    // ── Channel polling ──────────────────────────────────────────────────

    fn poll_hotkey(&mut self) {
        while let Ok(event) = self.hotkey_rx.try_recv() {
            match event {
                HotkeyEvent::ToggleMonitoring => {
                    self.submit(MonitorCommand::Toggle);
                }
            }
        }
    }

    fn sync_delay(&mut self, snap: &Snapshot) {
        match self.pending_delay {
            Some(sent) if snap.delay_ms != sent => {}
            _ => {
                self.pending_delay = None;
                self.delay_ms = snap.delay_ms;
            }
        }
    }

    // ── Panels ───────────────────────────────────────────────────────────

    fn draw_header(&self, ui: &mut egui::Ui, snap: &Snapshot) {
        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new("Mic Mirror")
                    .color(egui::Color32::from_rgb(200, 200, 200))
                    .size(15.0),
            );
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    egui::RichText::new(snap.phase.label())
                        .color(phase_color(snap.phase))
                        .size(13.0),
                );
            });
        });
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui, snap: &Snapshot) {
        ui.horizontal(|ui| {
            let label = if snap.phase == MonitorPhase::Enabled {
                "Disable monitoring"
            } else {
                "Enable monitoring"
            };
            let command = button_command(snap.phase);
            let button = egui::Button::new(egui::RichText::new(label).size(13.0));
            if ui.add_enabled(command.is_some(), button).clicked() {
                if let Some(command) = command {
                    self.submit(command);
                }
            }
            if let Some(key) = &self.hotkey_hint {
                ui.label(
                    egui::RichText::new(format!("or press {key}"))
                        .color(egui::Color32::from_rgb(120, 120, 120))
                        .size(11.0),
                );
            }
        });

        if snap.needs_activation {
            ui.label(
                egui::RichText::new("Playback needs to be started by hand.")
                    .color(egui::Color32::from_rgb(255, 136, 68))
                    .size(11.0),
            );
        }

        ui.add_space(6.0);
        let slider = egui::Slider::new(&mut self.delay_ms, 0..=self.max_delay_ms)
            .suffix(" ms")
            .text("Delay");
        let response = ui.add(slider);
        if response.drag_stopped() || (response.changed() && !response.dragged()) {
            self.request_delay(self.delay_ms);
        }

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let selected = snap
                .devices
                .iter()
                .find(|d| d.id == snap.selected_device_id)
                .map(|d| d.label.as_str())
                .unwrap_or(if snap.source_active { "Default" } else { "None" });

            egui::ComboBox::from_label("Input")
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    for device in &snap.devices {
                        let current = device.id == snap.selected_device_id;
                        if ui.selectable_label(current, &device.label).clicked() && !current {
                            self.submit(MonitorCommand::SwitchDevice(device.id.clone()));
                        }
                    }
                });

            if ui.small_button("Refresh").clicked() {
                self.submit(MonitorCommand::RefreshDevices);
            }
        });
    }

    fn draw_level(&self, ui: &mut egui::Ui, level: &LoudnessFrame) {
        let (rect, _) =
            ui.allocate_exact_size(egui::vec2(ui.available_width(), 10.0), egui::Sense::hover());
        let painter = ui.painter();
        painter.rect_filled(rect, 2.0, egui::Color32::from_rgb(50, 50, 50));

        let mut fill = rect;
        fill.set_width(rect.width() * level.average_level.clamp(0.0, 1.0));
        painter.rect_filled(fill, 2.0, egui::Color32::from_rgb(80, 200, 120));
    }

    /// Frequency bars, bottom-aligned, one per bin.
    fn draw_spectrum(&self, ui: &mut egui::Ui, level: &LoudnessFrame) {
        let (rect, _) =
            ui.allocate_exact_size(egui::vec2(ui.available_width(), 80.0), egui::Sense::hover());

        let painter = ui.painter();
        let heights = bar_heights(&level.frequency_bins, rect.height());
        let bar_width = rect.width() / heights.len().max(1) as f32;

        for (i, h) in heights.into_iter().enumerate() {
            let x = rect.left() + i as f32 * bar_width;
            painter.rect_filled(
                egui::Rect::from_min_max(
                    egui::pos2(x, rect.bottom() - h),
                    egui::pos2(x + (bar_width * 0.8).max(1.0), rect.bottom()),
                ),
                0.0,
                egui::Color32::from_rgb(68, 136, 255),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Command for the enable/disable button; `None` while a transition runs.
fn button_command(phase: MonitorPhase) -> Option<MonitorCommand> {
    match phase {
        MonitorPhase::Disabled => Some(MonitorCommand::Enable),
        MonitorPhase::Enabled => Some(MonitorCommand::Disable),
        MonitorPhase::Enabling | MonitorPhase::Rebuilding => None,
    }
}

/// Bar heights for `bins` in a rect `height` points tall (minimum 1 point).
fn bar_heights(bins: &[u8], height: f32) -> Vec<f32> {
    bins.iter()
        .map(|&b| (b as f32 / 255.0 * height).max(1.0))
        .collect()
}

fn phase_color(phase: MonitorPhase) -> egui::Color32 {
    match phase {
        MonitorPhase::Disabled => egui::Color32::from_rgb(120, 120, 120),
        MonitorPhase::Enabling | MonitorPhase::Rebuilding => egui::Color32::from_rgb(68, 136, 255),
        MonitorPhase::Enabled => egui::Color32::from_rgb(80, 200, 120),
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for MirrorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.retry_deferred();
        self.poll_hotkey();

        let snap = Snapshot::take(&self.state);
        self.sync_delay(&snap);

        // The level display is live whenever a source is held.
        ctx.request_repaint_after(self.repaint_every);

        let frame = egui::Frame::new()
            .fill(egui::Color32::from_rgb(30, 30, 30))
            .inner_margin(egui::Margin::same(12));

        egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
            self.draw_header(ui, &snap);
            ui.separator();
            self.draw_controls(ui, &snap);

            ui.add_space(10.0);
            self.draw_level(ui, &snap.level);
            ui.add_space(4.0);
            self.draw_spectrum(ui, &snap.level);

            if let Some(status) = &snap.status {
                ui.add_space(6.0);
                ui.label(
                    egui::RichText::new(status.as_str())
                        .color(egui::Color32::from_rgb(255, 136, 68))
                        .size(12.0),
                );
            }
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        log::info!("monitor window closing; requesting teardown");
        self.monitor.teardown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{monitor_channel, new_shared_state};

    #[test]
    fn button_follows_phase() {
        assert_eq!(
            button_command(MonitorPhase::Disabled),
            Some(MonitorCommand::Enable)
        );
        assert_eq!(
            button_command(MonitorPhase::Enabled),
            Some(MonitorCommand::Disable)
        );
        assert_eq!(button_command(MonitorPhase::Enabling), None);
        assert_eq!(button_command(MonitorPhase::Rebuilding), None);
    }

    fn app_with_queue(capacity: usize) -> (MirrorApp, crate::monitor::MonitorInbox) {
        let (handle, inbox) = monitor_channel(capacity);
        let (_hotkey_tx, hotkey_rx) = mpsc::channel(1);
        let state = new_shared_state(0, 128);
        let app = MirrorApp::new(state, handle, hotkey_rx, &AppConfig::default());
        (app, inbox)
    }

    #[test]
    fn refused_delay_is_not_marked_pending() {
        let (mut app, mut inbox) = app_with_queue(1);
        assert!(app.submit(MonitorCommand::Enable));

        app.request_delay(300);
        assert_eq!(app.pending_delay, None);
        assert_eq!(app.deferred, Some(MonitorCommand::SetDelay(300)));

        // A newer target replaces the refused one.
        app.request_delay(450);
        assert_eq!(app.deferred, Some(MonitorCommand::SetDelay(450)));

        assert_eq!(inbox.try_next(), Some(MonitorCommand::Enable));
        app.retry_deferred();
        assert_eq!(app.pending_delay, Some(450));
        assert_eq!(app.deferred, None);
        assert_eq!(inbox.try_next(), Some(MonitorCommand::SetDelay(450)));
    }

    #[test]
    fn slider_follows_state_once_no_delay_is_pending() {
        let (mut app, _inbox) = app_with_queue(4);
        app.request_delay(200);

        let mut snap = Snapshot::take(&app.state);
        app.sync_delay(&snap);
        assert_eq!(app.pending_delay, Some(200));

        snap.delay_ms = 200;
        app.sync_delay(&snap);
        assert_eq!(app.pending_delay, None);
        assert_eq!(app.delay_ms, 200);
    }

    #[test]
    fn bar_heights_scale_to_rect() {
        assert_eq!(bar_heights(&[0, 255, 51], 100.0), vec![1.0, 100.0, 20.0]);
        assert!(bar_heights(&[], 100.0).is_empty());
    }
}
