//! Linux delivery backends.
//!
//! Wayland compositors get `wl-copy` plus `ydotool` (uinput-level, works on
//! every compositor); X11 gets `xclip` plus `xdotool`. `ydotool` needs its
//! daemon; if `ydotoold` is installed but not running it is spawned once as
//! a detached process.

use super::{require_tool, InjectError, PasteMode};
use crate::logging::log_debug;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::time::Duration;

const CLIPBOARD_CLEAR_DELAY: Duration = Duration::from_millis(100);

pub fn inject(text: &str, mode: PasteMode) -> Result<(), InjectError> {
    if is_wayland() {
        inject_wayland(text, mode)
    } else {
        inject_x11(text, mode)
    }
}

fn is_wayland() -> bool {
    if std::env::var_os("WAYLAND_DISPLAY").is_some_and(|v| !v.is_empty()) {
        return true;
    }
    std::env::var("XDG_SESSION_TYPE")
        .map(|v| v.eq_ignore_ascii_case("wayland"))
        .unwrap_or(false)
}

fn run(cmd: &mut Command, what: &str) -> Result<(), InjectError> {
    let status = cmd
        .status()
        .map_err(|e| InjectError::BackendInvocationFailed(format!("{what}: {e}")))?;
    if !status.success() {
        return Err(InjectError::BackendInvocationFailed(format!(
            "{what}: exit {status}"
        )));
    }
    Ok(())
}

fn inject_wayland(text: &str, mode: PasteMode) -> Result<(), InjectError> {
    require_tool("ydotool", "install with: apt install ydotool")?;
    ensure_ydotoold();

    match mode {
        PasteMode::Type => {
            run(Command::new("ydotool").args(["type", "--", text]), "ydotool type")?;
        }
        PasteMode::Clipboard => {
            require_tool("wl-copy", "install with: apt install wl-clipboard")?;
            run(Command::new("wl-copy").arg("--").arg(text), "wl-copy")?;
            run(
                Command::new("ydotool").args(["key", "--delay", "0", "ctrl+v"]),
                "ydotool key ctrl+v",
            )?;
            // Best-effort clear; a failure here must not undo the paste.
            std::thread::sleep(CLIPBOARD_CLEAR_DELAY);
            let _ = Command::new("wl-copy").arg("--clear").status();
        }
    }
    Ok(())
}

fn inject_x11(text: &str, mode: PasteMode) -> Result<(), InjectError> {
    require_tool("xdotool", "install with: apt install xdotool")?;
    match mode {
        PasteMode::Type => {
            run(Command::new("xdotool").args(["type", "--", text]), "xdotool type")?;
        }
        PasteMode::Clipboard => {
            require_tool("xclip", "install with: apt install xclip")?;
            write_x11_clipboard(text)?;
            run(Command::new("xdotool").args(["key", "ctrl+v"]), "xdotool key ctrl+v")?;
            std::thread::sleep(CLIPBOARD_CLEAR_DELAY);
            let _ = write_x11_clipboard("");
        }
    }
    Ok(())
}

fn write_x11_clipboard(text: &str) -> Result<(), InjectError> {
    let mut child = Command::new("xclip")
        .args(["-selection", "clipboard"])
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| InjectError::BackendInvocationFailed(format!("xclip: {e}")))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .map_err(|e| InjectError::BackendInvocationFailed(format!("xclip stdin: {e}")))?;
    }
    let status = child
        .wait()
        .map_err(|e| InjectError::BackendInvocationFailed(format!("xclip wait: {e}")))?;
    if !status.success() {
        return Err(InjectError::BackendInvocationFailed(format!(
            "xclip: exit {status}"
        )));
    }
    Ok(())
}

/// Start `ydotoold` detached if it is installed but not running, then give
/// it a moment to create its socket.
fn ensure_ydotoold() {
    let running = Command::new("pgrep")
        .args(["-x", "ydotoold"])
        .stdout(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    if running {
        return;
    }
    if require_tool("ydotoold", "").is_err() {
        return;
    }
    let mut cmd = Command::new("ydotoold");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // Own process group so it survives us and never receives our signals.
    cmd.process_group(0);
    match cmd.spawn() {
        Ok(_) => {
            log_debug("paste", "spawned ydotoold");
            std::thread::sleep(Duration::from_millis(200));
        }
        Err(err) => log_debug("paste", &format!("failed to spawn ydotoold: {err}")),
    }
}
