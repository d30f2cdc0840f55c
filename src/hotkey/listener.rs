//! Dedicated OS-thread hotkey listener using `rdev::listen`.
//!
//! `rdev::listen` has no shutdown API.  Dropping the [`HotkeyListener`] sets
//! a stop flag so the callback discards further events; the thread itself
//! stays blocked in rdev until the process exits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use super::HotkeyEvent;

// ---------------------------------------------------------------------------
// KeyToggle
// ---------------------------------------------------------------------------

/// Turns raw key events into one toggle per physical key press.
///
/// Holding the key produces repeated `KeyPress` events; only the first one
/// after a release counts.
#[derive(Debug)]
pub struct KeyToggle {
    key: rdev::Key,
    held: bool,
}

impl KeyToggle {
    pub fn new(key: rdev::Key) -> Self {
        Self { key, held: false }
    }

    pub fn on_event(&mut self, event: &rdev::EventType) -> Option<HotkeyEvent> {
        match *event {
            rdev::EventType::KeyPress(k) if k == self.key => {
                let first = !self.held;
                self.held = true;
                first.then_some(HotkeyEvent::ToggleMonitoring)
            }
            rdev::EventType::KeyRelease(k) if k == self.key => {
                self.held = false;
                None
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyListener
// ---------------------------------------------------------------------------

/// Handle to a running hotkey listener thread.  Drop it to stop forwarding
/// events.
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Spawn the listener thread, forwarding toggles for `key` on `tx`.
    ///
    /// The thread uses `blocking_send`, so `tx` may belong to any runtime.
    pub fn start(key: rdev::Key, tx: mpsc::Sender<HotkeyEvent>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut toggle = KeyToggle::new(key);
                let result = rdev::listen(move |event| {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(ev) = toggle.on_event(&event.event_type) {
                        let _ = tx.blocking_send(ev);
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {:?}", e);
                }
            })?;

        log::info!("hotkey-listener: toggling monitoring with {key:?}");
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
