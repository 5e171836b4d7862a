//! evdev-based hotkey listener.
//!
//! Reads key events straight from the kernel input layer, which works on
//! every compositor. Device auto-detection scans `/dev/input/event*` in
//! numeric order and accepts the first device that declares the letter keys
//! A..Z and no relative axes (rules out mice and power buttons). Requires
//! read access to the device node, typically membership in the `input`
//! group.

use super::{key_code_from_name, HotkeyBinding, HotkeyError, HotkeyEvent, Listener, ListenerHandle};
use crate::logging::log_debug;
use crossbeam_channel::Sender;
use evdev::{Device, EventType, Key};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const POLL_INTERVAL_MS: i32 = 200;

pub struct EvdevListener {
    device: Device,
    key_code: u16,
    label: String,
    _handle: ListenerHandle,
}

impl EvdevListener {
    /// Open the configured device (or auto-detect a keyboard) and resolve
    /// the bound key. Modifier combos are not expressible at the evdev
    /// layer; bindings must be a single `KEY_*` name.
    pub fn open(
        binding: HotkeyBinding,
        device_path: &str,
        handle: ListenerHandle,
    ) -> Result<Self, HotkeyError> {
        if !binding.modifiers.is_empty() {
            return Err(HotkeyError::InvalidBinding {
                combo: binding.label,
                reason: "modifier combos are not supported on Linux; use an evdev key name like KEY_F12"
                    .to_string(),
            });
        }
        let key_name = binding.key.as_deref().ok_or_else(|| HotkeyError::InvalidBinding {
            combo: binding.label.clone(),
            reason: "a main key is required".to_string(),
        })?;
        let key_code = key_code_from_name(key_name).ok_or_else(|| HotkeyError::InvalidBinding {
            combo: binding.label.clone(),
            reason: format!("unknown key name: {key_name}"),
        })?;

        let device = if device_path.is_empty() {
            find_keyboard()?
        } else {
            open_device(Path::new(device_path))?
        };
        log_debug(
            "hotkey",
            &format!(
                "listening for {} (code={key_code}) on {}",
                binding.label,
                device.name().unwrap_or("unnamed device")
            ),
        );
        Ok(Self {
            device,
            key_code,
            label: binding.label,
            _handle: handle,
        })
    }
}

impl Listener for EvdevListener {
    fn run(
        &mut self,
        events: Sender<HotkeyEvent>,
        stop: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        let fd = self.device.as_raw_fd();
        while !stop.load(Ordering::Relaxed) {
            // Bounded wait so cancellation is observed even when the
            // keyboard is silent.
            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let n = unsafe { libc::poll(&mut pfd, 1, POLL_INTERVAL_MS) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(HotkeyError::DeviceUnavailable(err.to_string()));
            }
            if n == 0 {
                continue;
            }
            let batch = match self.device.fetch_events() {
                Ok(batch) => batch,
                Err(err) => {
                    if stop.load(Ordering::Relaxed) {
                        return Ok(());
                    }
                    return Err(HotkeyError::DeviceUnavailable(err.to_string()));
                }
            };
            for ev in batch {
                if ev.event_type() != EventType::KEY {
                    continue;
                }
                if let Some(event) = key_event_action(self.key_code, ev.code(), ev.value()) {
                    let _ = events.send(event);
                }
            }
        }
        Ok(())
    }

    fn binding_label(&self) -> &str {
        &self.label
    }
}

fn open_device(path: &Path) -> Result<Device, HotkeyError> {
    Device::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::PermissionDenied => HotkeyError::PermissionDenied(format!(
            "cannot read {}; add your user to the 'input' group or run with elevated privileges",
            path.display()
        )),
        _ => HotkeyError::DeviceUnavailable(format!("open {}: {err}", path.display())),
    })
}

/// Scan `/dev/input/event*` in numeric order and return the first device
/// that looks like a real keyboard.
fn find_keyboard() -> Result<Device, HotkeyError> {
    let mut nodes: Vec<(u32, PathBuf)> = Vec::new();
    let entries = std::fs::read_dir("/dev/input")
        .map_err(|err| HotkeyError::DeviceUnavailable(format!("read /dev/input: {err}")))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(num) = name.strip_prefix("event").and_then(|n| n.parse::<u32>().ok()) {
            nodes.push((num, path));
        }
    }
    nodes.sort_by_key(|(num, _)| *num);

    let mut permission_hit = false;
    for (_, path) in nodes {
        let device = match Device::open(&path) {
            Ok(device) => device,
            Err(err) => {
                if err.kind() == io::ErrorKind::PermissionDenied {
                    permission_hit = true;
                }
                continue;
            }
        };
        if is_keyboard(&device) {
            return Ok(device);
        }
    }
    if permission_hit {
        return Err(HotkeyError::PermissionDenied(
            "no readable keyboard in /dev/input; add your user to the 'input' group".to_string(),
        ));
    }
    Err(HotkeyError::DeviceUnavailable(
        "no keyboard device found in /dev/input/event*".to_string(),
    ))
}

/// Map one EV_KEY event to the observer contract: value 1 is a press,
/// value 0 a release, value 2 (kernel auto-repeat) is dropped so a held key
/// produces exactly one Pressed.
fn key_event_action(bound_code: u16, code: u16, value: i32) -> Option<HotkeyEvent> {
    if code != bound_code {
        return None;
    }
    match value {
        1 => Some(HotkeyEvent::Pressed),
        0 => Some(HotkeyEvent::Released),
        _ => None,
    }
}

/// A keyboard declares the letter keys and no relative axes; relative axes
/// mean a mouse or trackpad.
fn is_keyboard(device: &Device) -> bool {
    if device.supported_events().contains(EventType::RELATIVE) {
        return false;
    }
    device
        .supported_keys()
        .map(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_Z))
        .unwrap_or(false)
}
