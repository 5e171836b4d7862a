//! Delivery of transcribed text into the focused application.
//!
//! Two modes: "type" synthesizes keystrokes directly; "clipboard" places
//! the text on the system clipboard, sends the platform paste shortcut,
//! then clears the clipboard shortly afterwards (best-effort) so clipboard
//! managers do not retain dictated text. The backend is picked per display
//! server at call time; the injector itself is stateless.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("{name} not found: {hint}")]
    BackendMissing { name: String, hint: String },
    #[error("text injection failed: {0}")]
    BackendInvocationFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteMode {
    Clipboard,
    Type,
}

impl PasteMode {
    /// Config string → mode; anything unrecognized falls back to clipboard.
    pub fn from_config(mode: &str) -> Self {
        match mode {
            "type" => PasteMode::Type,
            _ => PasteMode::Clipboard,
        }
    }
}

/// Injects text into whatever currently has keyboard focus.
pub trait Inject: Send + Sync {
    fn inject(&self, text: &str, delay_ms: u64, mode: PasteMode) -> Result<(), InjectError>;
}

/// Platform-backed injector used by the real application.
pub struct SystemInjector;

impl Inject for SystemInjector {
    fn inject(&self, text: &str, delay_ms: u64, mode: PasteMode) -> Result<(), InjectError> {
        if delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(delay_ms));
        }
        platform_inject(text, mode)
    }
}

#[cfg(target_os = "linux")]
fn platform_inject(text: &str, mode: PasteMode) -> Result<(), InjectError> {
    linux::inject(text, mode)
}

#[cfg(target_os = "macos")]
fn platform_inject(text: &str, mode: PasteMode) -> Result<(), InjectError> {
    macos::inject(text, mode)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_inject(_text: &str, _mode: PasteMode) -> Result<(), InjectError> {
    Err(InjectError::BackendInvocationFailed(
        "text injection is not supported on this platform".to_string(),
    ))
}

/// Escape text for an AppleScript double-quoted string literal so embedded
/// quotes cannot break out of it and run their own script. Backspace has no
/// keystroke meaning and is stripped. Platform-neutral so the contract is
/// testable everywhere.
pub fn escape_applescript(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => {}
            other => out.push(other),
        }
    }
    out
}

/// Resolve a helper binary on PATH, mirroring exec.LookPath. Returns the
/// full path or a `BackendMissing` error carrying the install hint.
pub(crate) fn require_tool(name: &str, hint: &str) -> Result<PathBuf, InjectError> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(InjectError::BackendMissing {
        name: name.to_string(),
        hint: hint.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_with_clipboard_fallback() {
        assert_eq!(PasteMode::from_config("type"), PasteMode::Type);
        assert_eq!(PasteMode::from_config("clipboard"), PasteMode::Clipboard);
        assert_eq!(PasteMode::from_config("anything"), PasteMode::Clipboard);
    }

    #[test]
    fn require_tool_finds_sh() {
        assert!(require_tool("sh", "install a shell").is_ok());
    }

    #[test]
    fn require_tool_reports_missing_with_hint() {
        match require_tool("definitely-not-a-real-binary", "apt install nothing") {
            Err(InjectError::BackendMissing { name, hint }) => {
                assert_eq!(name, "definitely-not-a-real-binary");
                assert!(hint.contains("apt"));
            }
            other => panic!("expected BackendMissing, got {other:?}"),
        }
    }

    #[test]
    fn applescript_escaping_covers_quotes_and_backslashes() {
        assert_eq!(
            escape_applescript(r#""hello\world""#),
            r#"\"hello\\world\""#
        );
    }

    #[test]
    fn applescript_escaping_strips_backspace() {
        assert_eq!(escape_applescript("hello\u{8}world"), "helloworld");
    }

    #[test]
    fn applescript_escaping_handles_control_whitespace() {
        assert_eq!(
            escape_applescript("line1\nline2 \"quoted\""),
            "line1\\nline2 \\\"quoted\\\""
        );
        assert_eq!(escape_applescript("a\tb\rc"), "a\\tb\\rc");
        assert_eq!(escape_applescript("plain text 123"), "plain text 123");
    }
}
