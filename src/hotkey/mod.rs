//! Global toggle hotkey, backed by `rdev`.
//!
//! `rdev::listen()` blocks its thread for the life of the process, so
//! [`HotkeyListener::start`] runs it on a dedicated OS thread and forwards
//! [`HotkeyEvent`]s over a tokio channel.  The UI drains that channel every
//! frame and turns each event into a monitor command.
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use mic_mirror::hotkey::{parse_key, HotkeyListener};
//!
//! let (tx, _rx) = mpsc::channel(16);
//! let key = parse_key("F9").unwrap_or(rdev::Key::F9);
//! let _listener = HotkeyListener::start(key, tx).expect("hotkey thread");
//! ```

pub mod listener;

pub use listener::{HotkeyListener, KeyToggle};

/// Events emitted by the hotkey listener thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The toggle key went down (auto-repeat is ignored).
    ToggleMonitoring,
}

const FUNCTION_KEYS: [rdev::Key; 12] = [
    rdev::Key::F1,
    rdev::Key::F2,
    rdev::Key::F3,
    rdev::Key::F4,
    rdev::Key::F5,
    rdev::Key::F6,
    rdev::Key::F7,
    rdev::Key::F8,
    rdev::Key::F9,
    rdev::Key::F10,
    rdev::Key::F11,
    rdev::Key::F12,
];

const LETTER_KEYS: [rdev::Key; 26] = [
    rdev::Key::KeyA,
    rdev::Key::KeyB,
    rdev::Key::KeyC,
    rdev::Key::KeyD,
    rdev::Key::KeyE,
    rdev::Key::KeyF,
    rdev::Key::KeyG,
    rdev::Key::KeyH,
    rdev::Key::KeyI,
    rdev::Key::KeyJ,
    rdev::Key::KeyK,
    rdev::Key::KeyL,
    rdev::Key::KeyM,
    rdev::Key::KeyN,
    rdev::Key::KeyO,
    rdev::Key::KeyP,
    rdev::Key::KeyQ,
    rdev::Key::KeyR,
    rdev::Key::KeyS,
    rdev::Key::KeyT,
    rdev::Key::KeyU,
    rdev::Key::KeyV,
    rdev::Key::KeyW,
    rdev::Key::KeyX,
    rdev::Key::KeyY,
    rdev::Key::KeyZ,
];

/// Parse a key name from the config into an [`rdev::Key`].
///
/// Accepts `F1`–`F12`, a handful of named keys and single letters, ignoring
/// case and surrounding whitespace.  Combinations such as `Ctrl+M` are not
/// supported and yield `None`.
///
/// ```
/// use mic_mirror::hotkey::parse_key;
///
/// assert_eq!(parse_key("F9"), Some(rdev::Key::F9));
/// assert_eq!(parse_key(" pause "), Some(rdev::Key::Pause));
/// assert_eq!(parse_key("m"), Some(rdev::Key::KeyM));
/// assert_eq!(parse_key("Ctrl+M"), None);
/// ```
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    let name = name.trim().to_ascii_uppercase();

    if let Some(n) = name.strip_prefix('F').and_then(|n| n.parse::<usize>().ok()) {
        return n.checked_sub(1).and_then(|i| FUNCTION_KEYS.get(i)).copied();
    }

    if let [c] = name.as_bytes() {
        if c.is_ascii_uppercase() {
            return Some(LETTER_KEYS[(c - b'A') as usize]);
        }
    }

    match name.as_str() {
        "ESC" | "ESCAPE" => Some(rdev::Key::Escape),
        "SPACE" => Some(rdev::Key::Space),
        "PAUSE" => Some(rdev::Key::Pause),
        "SCROLLLOCK" => Some(rdev::Key::ScrollLock),
        "PRINTSCREEN" => Some(rdev::Key::PrintScreen),
        "INSERT" => Some(rdev::Key::Insert),
        "HOME" => Some(rdev::Key::Home),
        "END" => Some(rdev::Key::End),
        _ => None,
    }
}
