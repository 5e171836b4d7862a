//! TOML configuration: load with defaults, validate, save atomically.
//!
//! The file lives at `~/.config/palaver/config.toml`. A missing file is not
//! an error; defaults apply. Saving never truncates in place: the new
//! content goes to a sibling temp file which is fsynced and renamed over
//! the destination.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Combo string: "Cmd+Option", "Ctrl+F5", or an evdev name like "KEY_F12".
    pub key: String,
    /// Input device path on Linux; empty means auto-detect.
    pub device: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: default_hotkey_key(),
            device: String::new(),
        }
    }
}

#[cfg(target_os = "macos")]
fn default_hotkey_key() -> String {
    "Cmd+Option".to_string()
}

#[cfg(not(target_os = "macos"))]
fn default_hotkey_key() -> String {
    "KEY_F12".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub target_sample_rate: u32,
    pub max_duration_sec: u64,
    pub chime_start: String,
    pub chime_stop: String,
    pub chime_enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            max_duration_sec: 60,
            chime_start: String::new(),
            chime_stop: String::new(),
            chime_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// "openai" or "command".
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub timeout_sec: u64,
    /// Shell template for the command provider; `{input}` is replaced with
    /// the temp WAV path.
    pub command: String,
    pub tls_skip_verify: bool,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "http://localhost:5092".to_string(),
            model: "whisper-1".to_string(),
            timeout_sec: 30,
            command: String::new(),
            tls_skip_verify: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasteConfig {
    pub delay_ms: u64,
    /// "clipboard" (copy + synthetic paste shortcut) or "type" (keystrokes).
    pub mode: String,
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            delay_ms: 50,
            mode: "clipboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub auto_start: bool,
    /// Data directory for the managed backend; empty means the default
    /// `~/.local/share/palaver`.
    pub data_dir: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            data_dir: String::new(),
            port: 5092,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessingConfig {
    pub enabled: bool,
    pub tone: String,
    pub model: String,
    pub base_url: String,
    pub timeout_sec: u64,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tone: "off".to_string(),
            model: String::new(),
            base_url: "http://localhost:11434/v1".to_string(),
            timeout_sec: 30,
        }
    }
}

/// A user-defined tone preset appended to the cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomTone {
    pub name: String,
    pub prompt: String,
}

/// A user-defined color theme; fields are hex colors like "#FF6AC1".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomTheme {
    pub name: String,
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub error: String,
    pub success: String,
    pub warning: String,
    pub background: String,
    pub text: String,
    pub dimmed: String,
    pub separator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theme: String,
    pub hotkey: HotkeyConfig,
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub paste: PasteConfig,
    pub server: ServerConfig,
    pub post_processing: PostProcessingConfig,
    #[serde(rename = "custom_tone")]
    pub custom_tones: Vec<CustomTone>,
    #[serde(rename = "custom_theme")]
    pub custom_themes: Vec<CustomTheme>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "synthwave".to_string(),
            hotkey: HotkeyConfig::default(),
            audio: AudioConfig::default(),
            transcription: TranscriptionConfig::default(),
            paste: PasteConfig::default(),
            server: ServerConfig::default(),
            post_processing: PostProcessingConfig::default(),
            custom_tones: Vec::new(),
            custom_themes: Vec::new(),
        }
    }
}

impl Config {
    /// Reject values the rest of the program cannot work with. Runs once at
    /// startup; a failure here exits the process non-zero.
    pub fn validate(&self) -> Result<()> {
        match self.transcription.provider.as_str() {
            "openai" => {
                if self.transcription.base_url.is_empty() {
                    bail!("transcription.base_url must not be empty for the openai provider");
                }
            }
            "command" => {
                if self.transcription.command.is_empty() {
                    bail!("transcription.command must not be empty for the command provider");
                }
            }
            other => bail!("unknown transcription provider: {other}"),
        }
        if !(8_000..=96_000).contains(&self.audio.target_sample_rate) {
            bail!(
                "audio.target_sample_rate must be between 8000 and 96000 Hz, got {}",
                self.audio.target_sample_rate
            );
        }
        if self.audio.max_duration_sec == 0 || self.audio.max_duration_sec > 600 {
            bail!(
                "audio.max_duration_sec must be between 1 and 600, got {}",
                self.audio.max_duration_sec
            );
        }
        if !matches!(self.paste.mode.as_str(), "clipboard" | "type") {
            bail!(
                "paste.mode must be \"clipboard\" or \"type\", got {:?}",
                self.paste.mode
            );
        }
        if self.transcription.timeout_sec == 0 {
            bail!("transcription.timeout_sec must be at least 1");
        }
        Ok(())
    }

    /// Resolved data directory for the managed backend.
    pub fn data_dir(&self) -> PathBuf {
        if self.server.data_dir.is_empty() {
            default_data_dir()
        } else {
            PathBuf::from(&self.server.data_dir)
        }
    }
}

/// `~/.config/palaver/config.toml` (or the platform equivalent).
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("palaver")
        .join("config.toml")
}

/// `~/.local/share/palaver` (or the platform equivalent).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("palaver")
}

/// Read the config from `path`. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<Config> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Config::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read config {}", path.display()));
        }
    };
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

/// Write the config atomically: temp file in the same directory, fsync,
/// rename over the destination. A crash mid-write leaves the old file intact.
pub fn save(path: &Path, cfg: &Config) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("create config dir {}", dir.display()))?;

    let serialized = toml::to_string_pretty(cfg).context("serialize config")?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".palaver-config-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .context("create config temp file")?;
    tmp.write_all(serialized.as_bytes())
        .context("write config temp file")?;
    tmp.as_file().sync_all().context("sync config temp file")?;
    tmp.persist(path)
        .with_context(|| format!("rename config into place at {}", path.display()))?;
    Ok(())
}
