//! Global push-to-talk hotkey observation.
//!
//! A `HotkeyBinding` describes one combo: an ordered set of modifiers plus
//! an optional main key. Bindings with no main key are "modifier-only" and
//! are matched against modifier-mask transitions instead of key events.
//! Platform listeners deliver `Pressed`/`Released` messages into the
//! coordinator inbox; they never call into the coordinator directly.

mod table;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

pub use table::{ListenerTable, LISTENER_CAPACITY};

use crate::config::HotkeyConfig;
use crossbeam_channel::Sender;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("invalid hotkey {combo:?}: {reason}")]
    InvalidBinding { combo: String, reason: String },
    #[error("input permission denied: {0}")]
    PermissionDenied(String),
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("hotkey listener limit reached ({0}); cannot register more listeners")]
    CapacityExceeded(usize),
}

/// One observable transition of the bound combo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    Pressed,
    Released,
}

/// Modifier keys, with mask values matching the CoreGraphics event flags so
/// the macOS tap can compare masks directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Shift,
    Ctrl,
    Option,
    Cmd,
}

impl Modifier {
    pub fn mask(self) -> u64 {
        match self {
            Modifier::Shift => 0x0002_0000,
            Modifier::Ctrl => 0x0004_0000,
            Modifier::Option => 0x0008_0000,
            Modifier::Cmd => 0x0010_0000,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHIFT" => Some(Modifier::Shift),
            "CTRL" | "CONTROL" => Some(Modifier::Ctrl),
            "OPTION" | "ALT" => Some(Modifier::Option),
            "CMD" | "META" | "SUPER" => Some(Modifier::Cmd),
            _ => None,
        }
    }
}

/// Combined mask of all modifiers this program matches against.
pub const ALL_MODIFIERS_MASK: u64 = 0x0002_0000 | 0x0004_0000 | 0x0008_0000 | 0x0010_0000;

/// Parsed combo, immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub modifiers: Vec<Modifier>,
    /// Normalized key name ("SPACE", "F5", "KEY_F12"), or None for
    /// modifier-only combos.
    pub key: Option<String>,
    /// The combo exactly as the user wrote it, for display.
    pub label: String,
}

impl HotkeyBinding {
    /// Parse "Cmd+Option", "Ctrl+F5", "Option+Space", or an evdev-style
    /// bare name like "KEY_F12".
    pub fn parse(combo: &str) -> Result<Self, HotkeyError> {
        let trimmed = combo.trim();
        let invalid = |reason: &str| HotkeyError::InvalidBinding {
            combo: combo.to_string(),
            reason: reason.to_string(),
        };
        if trimmed.is_empty() {
            return Err(invalid("empty combo"));
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("KEY_") {
            if key_code_from_name(&upper).is_none() {
                return Err(invalid("unknown evdev key name"));
            }
            return Ok(Self {
                modifiers: Vec::new(),
                key: Some(upper),
                label: trimmed.to_string(),
            });
        }

        let parts: Vec<&str> = trimmed.split('+').map(str::trim).collect();
        if parts.len() < 2 {
            return Err(invalid(
                "expected modifier+key or modifier+modifier (e.g. Option+Space, Cmd+Option)",
            ));
        }

        let last = parts[parts.len() - 1];
        if Modifier::from_name(last).is_some() {
            // Modifier-only combo such as "Cmd+Option".
            let mut modifiers = Vec::new();
            for part in &parts {
                let m = Modifier::from_name(part)
                    .ok_or_else(|| invalid(&format!("unknown modifier {part:?}")))?;
                if !modifiers.contains(&m) {
                    modifiers.push(m);
                }
            }
            return Ok(Self {
                modifiers,
                key: None,
                label: trimmed.to_string(),
            });
        }

        let mut modifiers = Vec::new();
        for part in &parts[..parts.len() - 1] {
            let m = Modifier::from_name(part)
                .ok_or_else(|| invalid(&format!("unknown modifier {part:?}")))?;
            if !modifiers.contains(&m) {
                modifiers.push(m);
            }
        }
        let key = last.to_ascii_uppercase();
        if !known_key_name(&key) {
            return Err(invalid(&format!("unknown key {last:?}")));
        }
        Ok(Self {
            modifiers,
            key: Some(key),
            label: trimmed.to_string(),
        })
    }

    pub fn is_modifier_only(&self) -> bool {
        self.key.is_none()
    }

    /// OR of the modifier masks.
    pub fn modifier_mask(&self) -> u64 {
        self.modifiers.iter().map(|m| m.mask()).sum::<u64>()
    }
}

/// Observes one binding and reports transitions into `events` until `stop`
/// is set. `run` blocks; callers give it a dedicated thread.
pub trait Listener: Send {
    fn run(&mut self, events: Sender<HotkeyEvent>, stop: Arc<AtomicBool>)
        -> Result<(), HotkeyError>;
    fn binding_label(&self) -> &str;
}

/// Owns the process-wide registration table; constructed once and passed
/// explicitly instead of living in a global.
pub struct HotkeyRegistry {
    table: Arc<Mutex<ListenerTable>>,
}

impl HotkeyRegistry {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(ListenerTable::new())),
        }
    }

    /// Parse the configured combo and build the platform listener. Each
    /// listener holds a table slot for its lifetime; the table enforces the
    /// registration cap.
    pub fn create_listener(&self, cfg: &HotkeyConfig) -> Result<Box<dyn Listener>, HotkeyError> {
        let binding = HotkeyBinding::parse(&cfg.key)?;
        let handle = ListenerHandle::allocate(&self.table)?;
        platform_listener(binding, cfg, handle)
    }
}

impl Default for HotkeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII slot in the listener table; releasing returns the id to the free list.
pub(crate) struct ListenerHandle {
    id: u8,
    table: Arc<Mutex<ListenerTable>>,
}

impl ListenerHandle {
    fn allocate(table: &Arc<Mutex<ListenerTable>>) -> Result<Self, HotkeyError> {
        let id = table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .alloc()?;
        Ok(Self {
            id,
            table: table.clone(),
        })
    }

    #[allow(dead_code)]
    pub(crate) fn id(&self) -> u8 {
        self.id
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .release(self.id);
    }
}

#[cfg(target_os = "linux")]
fn platform_listener(
    binding: HotkeyBinding,
    cfg: &HotkeyConfig,
    handle: ListenerHandle,
) -> Result<Box<dyn Listener>, HotkeyError> {
    linux::EvdevListener::open(binding, &cfg.device, handle).map(|l| Box::new(l) as Box<dyn Listener>)
}

#[cfg(target_os = "macos")]
fn platform_listener(
    binding: HotkeyBinding,
    _cfg: &HotkeyConfig,
    handle: ListenerHandle,
) -> Result<Box<dyn Listener>, HotkeyError> {
    macos::EventTapListener::new(binding, handle).map(|l| Box::new(l) as Box<dyn Listener>)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_listener(
    binding: HotkeyBinding,
    _cfg: &HotkeyConfig,
    _handle: ListenerHandle,
) -> Result<Box<dyn Listener>, HotkeyError> {
    Err(HotkeyError::DeviceUnavailable(format!(
        "global hotkeys are not supported on this platform (binding {})",
        binding.label
    )))
}

/// Key names accepted as the main key of a modifier+key combo.
fn known_key_name(name: &str) -> bool {
    matches!(
        name,
        "SPACE" | "RETURN" | "ENTER" | "ESCAPE" | "DELETE" | "TAB" | "LEFT" | "RIGHT" | "UP"
            | "DOWN"
    ) || name.len() == 1 && name.chars().all(|c| c.is_ascii_alphanumeric())
        || is_function_key(name)
}

fn is_function_key(name: &str) -> bool {
    name.strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .map(|n| (1..=20).contains(&n))
        .unwrap_or(false)
}

/// evdev key name → numeric code. Shared by the Linux listener and by
/// binding validation on every platform.
pub fn key_code_from_name(name: &str) -> Option<u16> {
    let upper = name.trim().to_ascii_uppercase();
    EVDEV_KEY_CODES
        .iter()
        .find(|(n, _)| *n == upper)
        .map(|&(_, code)| code)
}

#[rustfmt::skip]
static EVDEV_KEY_CODES: &[(&str, u16)] = &[
    ("KEY_ESC", 1), ("KEY_1", 2), ("KEY_2", 3), ("KEY_3", 4), ("KEY_4", 5),
    ("KEY_5", 6), ("KEY_6", 7), ("KEY_7", 8), ("KEY_8", 9), ("KEY_9", 10),
    ("KEY_0", 11), ("KEY_MINUS", 12), ("KEY_EQUAL", 13), ("KEY_BACKSPACE", 14),
    ("KEY_TAB", 15), ("KEY_Q", 16), ("KEY_W", 17), ("KEY_E", 18), ("KEY_R", 19),
    ("KEY_T", 20), ("KEY_Y", 21), ("KEY_U", 22), ("KEY_I", 23), ("KEY_O", 24),
    ("KEY_P", 25), ("KEY_LEFTBRACE", 26), ("KEY_RIGHTBRACE", 27), ("KEY_ENTER", 28),
    ("KEY_LEFTCTRL", 29), ("KEY_A", 30), ("KEY_S", 31), ("KEY_D", 32), ("KEY_F", 33),
    ("KEY_G", 34), ("KEY_H", 35), ("KEY_J", 36), ("KEY_K", 37), ("KEY_L", 38),
    ("KEY_SEMICOLON", 39), ("KEY_APOSTROPHE", 40), ("KEY_GRAVE", 41),
    ("KEY_LEFTSHIFT", 42), ("KEY_BACKSLASH", 43), ("KEY_Z", 44), ("KEY_X", 45),
    ("KEY_C", 46), ("KEY_V", 47), ("KEY_B", 48), ("KEY_N", 49), ("KEY_M", 50),
    ("KEY_COMMA", 51), ("KEY_DOT", 52), ("KEY_SLASH", 53), ("KEY_RIGHTSHIFT", 54),
    ("KEY_KPASTERISK", 55), ("KEY_LEFTALT", 56), ("KEY_SPACE", 57),
    ("KEY_CAPSLOCK", 58), ("KEY_F1", 59), ("KEY_F2", 60), ("KEY_F3", 61),
    ("KEY_F4", 62), ("KEY_F5", 63), ("KEY_F6", 64), ("KEY_F7", 65), ("KEY_F8", 66),
    ("KEY_F9", 67), ("KEY_F10", 68), ("KEY_NUMLOCK", 69), ("KEY_SCROLLLOCK", 70),
    ("KEY_F11", 87), ("KEY_F12", 88), ("KEY_RIGHTCTRL", 97), ("KEY_RIGHTALT", 100),
    ("KEY_HOME", 102), ("KEY_UP", 103), ("KEY_PAGEUP", 104), ("KEY_LEFT", 105),
    ("KEY_RIGHT", 106), ("KEY_END", 107), ("KEY_DOWN", 108), ("KEY_PAGEDOWN", 109),
    ("KEY_INSERT", 110), ("KEY_DELETE", 111), ("KEY_PAUSE", 119),
    ("KEY_LEFTMETA", 125), ("KEY_RIGHTMETA", 126),
    ("KEY_F13", 183), ("KEY_F14", 184), ("KEY_F15", 185), ("KEY_F16", 186),
    ("KEY_F17", 187), ("KEY_F18", 188), ("KEY_F19", 189), ("KEY_F20", 190),
    ("KEY_F21", 191), ("KEY_F22", 192), ("KEY_F23", 193), ("KEY_F24", 194),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modifier_plus_key() {
        let b = HotkeyBinding::parse("Ctrl+F5").unwrap();
        assert_eq!(b.modifiers, vec![Modifier::Ctrl]);
        assert_eq!(b.key.as_deref(), Some("F5"));
        assert_eq!(b.label, "Ctrl+F5");
        assert!(!b.is_modifier_only());
    }

    #[test]
    fn parses_modifier_only_combo() {
        let b = HotkeyBinding::parse("Cmd+Option").unwrap();
        assert_eq!(b.modifiers, vec![Modifier::Cmd, Modifier::Option]);
        assert!(b.key.is_none());
        assert!(b.is_modifier_only());
        assert_eq!(b.modifier_mask(), 0x0010_0000 | 0x0008_0000);
    }

    #[test]
    fn parses_evdev_style_bare_key() {
        let b = HotkeyBinding::parse("KEY_F12").unwrap();
        assert!(b.modifiers.is_empty());
        assert_eq!(b.key.as_deref(), Some("KEY_F12"));
    }

    #[test]
    fn evdev_names_are_case_insensitive() {
        let b = HotkeyBinding::parse("key_f12").unwrap();
        assert_eq!(b.key.as_deref(), Some("KEY_F12"));
    }

    #[test]
    fn rejects_empty_and_bare_non_evdev_keys() {
        assert!(HotkeyBinding::parse("").is_err());
        assert!(HotkeyBinding::parse("  ").is_err());
        assert!(HotkeyBinding::parse("Space").is_err());
    }

    #[test]
    fn rejects_unknown_modifier_and_key() {
        assert!(HotkeyBinding::parse("Hyper+Space").is_err());
        assert!(HotkeyBinding::parse("Ctrl+F99").is_err());
        assert!(HotkeyBinding::parse("KEY_FNORD").is_err());
    }

    #[test]
    fn alias_modifiers_resolve() {
        let b = HotkeyBinding::parse("Alt+Space").unwrap();
        assert_eq!(b.modifiers, vec![Modifier::Option]);
        let b = HotkeyBinding::parse("Control+Shift+A").unwrap();
        assert_eq!(b.modifiers, vec![Modifier::Ctrl, Modifier::Shift]);
    }

    #[test]
    fn duplicate_modifiers_collapse() {
        let b = HotkeyBinding::parse("Ctrl+Ctrl+Space").unwrap();
        assert_eq!(b.modifiers, vec![Modifier::Ctrl]);
    }

    #[test]
    fn key_codes_match_kernel_values() {
        assert_eq!(key_code_from_name("KEY_A"), Some(30));
        assert_eq!(key_code_from_name("KEY_Z"), Some(44));
        assert_eq!(key_code_from_name("KEY_F12"), Some(88));
        assert_eq!(key_code_from_name("key_space"), Some(57));
        assert_eq!(key_code_from_name("KEY_NOPE"), None);
    }

    #[test]
    fn rejected_combos_never_touch_the_table() {
        let registry = HotkeyRegistry::new();
        for _ in 0..LISTENER_CAPACITY + 10 {
            let cfg = HotkeyConfig {
                key: "not-a-combo".to_string(),
                device: String::new(),
            };
            assert!(registry.create_listener(&cfg).is_err());
        }
        assert_eq!(registry.table.lock().unwrap().occupied_count(), 0);
    }

    #[test]
    fn listener_handles_release_their_slot_on_drop() {
        let registry = HotkeyRegistry::new();
        let mut held = Vec::new();
        for _ in 0..LISTENER_CAPACITY {
            held.push(ListenerHandle::allocate(&registry.table).unwrap());
        }
        assert!(matches!(
            ListenerHandle::allocate(&registry.table),
            Err(HotkeyError::CapacityExceeded(LISTENER_CAPACITY))
        ));

        let freed = held.pop().unwrap().id();
        // Popping dropped the handle; its id comes straight back.
        let reused = ListenerHandle::allocate(&registry.table).unwrap();
        assert_eq!(reused.id(), freed);
    }
}
