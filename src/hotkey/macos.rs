//! CoreGraphics event-tap hotkey listener.
//!
//! Installs a listen-only session tap. Modifier-only combos watch
//! flags-changed events and fire when the masked modifier bits become
//! exactly the bound mask; modifier+key combos watch keyDown/keyUp, with an
//! `active` flag collapsing OS auto-repeat into one press. Key-up fires
//! regardless of the current modifier state because users routinely release
//! the modifier first. Requires the Input Monitoring grant.

use super::{
    HotkeyBinding, HotkeyError, HotkeyEvent, Listener, ListenerHandle, ALL_MODIFIERS_MASK,
};
use crate::logging::log_debug;
use core_foundation::date::CFTimeInterval;
use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType, EventField,
};
use crossbeam_channel::Sender;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const RUNLOOP_SLICE_SECS: CFTimeInterval = 0.25;

pub struct EventTapListener {
    binding: HotkeyBinding,
    key_code: Option<i64>,
    _handle: ListenerHandle,
}

impl EventTapListener {
    pub fn new(mut binding: HotkeyBinding, handle: ListenerHandle) -> Result<Self, HotkeyError> {
        // evdev-style bare keys come from cross-platform config files; a
        // bare key cannot be tapped globally without hijacking normal
        // typing, so Option becomes the implied modifier.
        if binding.modifiers.is_empty()
            && binding.key.as_deref().is_some_and(|k| k.starts_with("KEY_"))
        {
            binding.modifiers.push(super::Modifier::Option);
        }
        let key_code = match binding.key.as_deref() {
            Some(name) => Some(virtual_key_code(name).ok_or_else(|| {
                HotkeyError::InvalidBinding {
                    combo: binding.label.clone(),
                    reason: format!("key {name:?} has no macOS virtual key code"),
                }
            })?),
            None => None,
        };
        Ok(Self {
            binding,
            key_code,
            _handle: handle,
        })
    }
}

impl Listener for EventTapListener {
    fn run(
        &mut self,
        events: Sender<HotkeyEvent>,
        stop: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        let mod_mask = self.binding.modifier_mask();
        let key_code = self.key_code;
        let active = Cell::new(false);
        let needs_reenable = Arc::new(AtomicBool::new(false));
        let reenable_flag = needs_reenable.clone();

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![
                CGEventType::KeyDown,
                CGEventType::KeyUp,
                CGEventType::FlagsChanged,
                CGEventType::TapDisabledByTimeout,
                CGEventType::TapDisabledByUserInput,
            ],
            move |_proxy, event_type, event| {
                match event_type {
                    CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                        // Re-enable without emitting; the run loop slice
                        // below picks the flag up.
                        reenable_flag.store(true, Ordering::Relaxed);
                        return None;
                    }
                    _ => {}
                }
                let got_mods = event.get_flags().bits() & ALL_MODIFIERS_MASK;
                match key_code {
                    // Modifier-only combo: track mask transitions.
                    None => {
                        if !matches!(event_type, CGEventType::FlagsChanged) {
                            return None;
                        }
                        if got_mods == mod_mask {
                            if !active.get() {
                                active.set(true);
                                let _ = events.send(HotkeyEvent::Pressed);
                            }
                        } else if active.get() {
                            active.set(false);
                            let _ = events.send(HotkeyEvent::Released);
                        }
                    }
                    Some(code) => {
                        let keycode =
                            event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                        if keycode != code {
                            return None;
                        }
                        match event_type {
                            CGEventType::KeyDown => {
                                // First press only; repeats arrive with
                                // active already set.
                                if !active.get() && got_mods == mod_mask {
                                    active.set(true);
                                    let _ = events.send(HotkeyEvent::Pressed);
                                }
                            }
                            CGEventType::KeyUp => {
                                if active.get() {
                                    active.set(false);
                                    let _ = events.send(HotkeyEvent::Released);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                None
            },
        )
        .map_err(|_| {
            HotkeyError::PermissionDenied(
                "cannot create event tap; grant Input Monitoring in System Settings > Privacy & Security"
                    .to_string(),
            )
        })?;

        let source = tap.mach_port.create_runloop_source(0).map_err(|_| {
            HotkeyError::DeviceUnavailable("cannot create event tap run loop source".to_string())
        })?;
        let run_loop = CFRunLoop::get_current();
        unsafe {
            run_loop.add_source(&source, kCFRunLoopDefaultMode);
        }
        tap.enable();
        log_debug("hotkey", &format!("event tap installed for {}", self.binding.label));

        // Short run-loop slices keep cancellation and tap re-enable bounded
        // without cross-thread CFRunLoop juggling.
        while !stop.load(Ordering::Relaxed) {
            CFRunLoop::run_in_mode(
                unsafe { kCFRunLoopDefaultMode },
                std::time::Duration::from_secs_f64(RUNLOOP_SLICE_SECS),
                true,
            );
            if needs_reenable.swap(false, Ordering::Relaxed) {
                tap.enable();
            }
        }
        Ok(())
    }

    fn binding_label(&self) -> &str {
        &self.binding.label
    }
}

/// macOS virtual key codes for the key names the binding parser accepts.
#[rustfmt::skip]
fn virtual_key_code(name: &str) -> Option<i64> {
    let code = match name {
        "A" => 0x00, "S" => 0x01, "D" => 0x02, "F" => 0x03, "H" => 0x04,
        "G" => 0x05, "Z" => 0x06, "X" => 0x07, "C" => 0x08, "V" => 0x09,
        "B" => 0x0B, "Q" => 0x0C, "W" => 0x0D, "E" => 0x0E, "R" => 0x0F,
        "Y" => 0x10, "T" => 0x11, "1" => 0x12, "2" => 0x13, "3" => 0x14,
        "4" => 0x15, "6" => 0x16, "5" => 0x17, "9" => 0x19, "7" => 0x1A,
        "8" => 0x1C, "0" => 0x1D, "O" => 0x1F, "U" => 0x20, "I" => 0x22,
        "P" => 0x23, "RETURN" | "ENTER" => 0x24, "L" => 0x25, "J" => 0x26,
        "K" => 0x28, "N" => 0x2D, "M" => 0x2E, "TAB" => 0x30, "SPACE" => 0x31,
        "DELETE" => 0x33, "ESCAPE" => 0x35,
        "F17" => 0x40, "F18" => 0x4F, "F19" => 0x50, "F20" => 0x5A,
        "F5" => 0x60, "F6" => 0x61, "F7" => 0x62, "F3" => 0x63, "F8" => 0x64,
        "F9" => 0x65, "F11" => 0x67, "F13" => 0x69, "F16" => 0x6A,
        "F14" => 0x6B, "F10" => 0x6D, "F12" => 0x6F, "F15" => 0x71,
        "F4" => 0x76, "F2" => 0x78, "F1" => 0x7A,
        "LEFT" => 0x7B, "RIGHT" => 0x7C, "DOWN" => 0x7D, "UP" => 0x7E,
        // evdev-style names accepted for cross-platform config files.
        other => {
            if let Some(stripped) = other.strip_prefix("KEY_") {
                return virtual_key_code(stripped);
            }
            return None;
        }
    };
    Some(code)
}
