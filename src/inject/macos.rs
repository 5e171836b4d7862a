//! macOS delivery via pbcopy and AppleScript System Events.

use super::{require_tool, InjectError, PasteMode};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

const CLIPBOARD_CLEAR_DELAY: Duration = Duration::from_millis(100);

const ACCESSIBILITY_HINT: &str =
    "grant Accessibility permissions in System Settings > Privacy & Security";

pub fn inject(text: &str, mode: PasteMode) -> Result<(), InjectError> {
    match mode {
        PasteMode::Type => type_applescript(text),
        PasteMode::Clipboard => paste_clipboard(text),
    }
}

fn pbcopy(text: &str) -> Result<(), InjectError> {
    require_tool("pbcopy", "pbcopy ships with macOS; check your PATH")?;
    let mut child = Command::new("pbcopy")
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| InjectError::BackendInvocationFailed(format!("pbcopy: {e}")))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .map_err(|e| InjectError::BackendInvocationFailed(format!("pbcopy stdin: {e}")))?;
    }
    let status = child
        .wait()
        .map_err(|e| InjectError::BackendInvocationFailed(format!("pbcopy wait: {e}")))?;
    if !status.success() {
        return Err(InjectError::BackendInvocationFailed(format!(
            "pbcopy: exit {status}"
        )));
    }
    Ok(())
}

fn osascript(script: &str, what: &str) -> Result<(), InjectError> {
    let status = Command::new("osascript")
        .args(["-e", script])
        .status()
        .map_err(|e| InjectError::BackendInvocationFailed(format!("{what}: {e}")))?;
    if !status.success() {
        return Err(InjectError::BackendInvocationFailed(format!(
            "{what}: exit {status} ({ACCESSIBILITY_HINT})"
        )));
    }
    Ok(())
}

fn paste_clipboard(text: &str) -> Result<(), InjectError> {
    pbcopy(text)?;
    osascript(
        r#"tell application "System Events" to keystroke "v" using command down"#,
        "osascript Cmd+V",
    )?;
    // Best-effort clear; never overrides the successful paste above.
    std::thread::sleep(CLIPBOARD_CLEAR_DELAY);
    let _ = pbcopy("");
    Ok(())
}

fn type_applescript(text: &str) -> Result<(), InjectError> {
    let escaped = super::escape_applescript(text);
    let script = format!(r#"tell application "System Events" to keystroke "{escaped}""#);
    osascript(&script, "osascript keystroke")
}
