use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use palaver::app::App;
use palaver::audio::Recorder;
use palaver::config::{self, Config};
use palaver::hotkey::HotkeyRegistry;
use palaver::inject::SystemInjector;
use palaver::logging::{init_logging, log_debug, set_log_sink};
use palaver::postprocess::ToneRegistry;
use palaver::server::Server;
use palaver::transcribe::new_transcriber;
use palaver::ui::{self, ThemeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "palaver",
    about = "Push-to-talk dictation: hold a key, speak, release, paste.",
    version
)]
struct Cli {
    /// Verbose debug logging (shown in the panel's debug pane)
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download and verify the managed transcription backend
    Setup,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Some(Command::Setup) => run_setup(),
        None => run(cli.debug),
    }
}

fn run_setup() -> Result<()> {
    let cfg_path = config::default_path();
    let cfg = config::load(&cfg_path).context("load config")?;
    cfg.validate().context("invalid config")?;
    let server = Server::new(&cfg.server, cfg.data_dir());

    println!("=== Palaver Setup ===");
    println!();

    let progress = |stage: &str, downloaded: u64, total: Option<u64>| match total {
        Some(total) if total > 0 => {
            let pct = downloaded as f64 / total as f64 * 100.0;
            print!("\r  [{stage}] {pct:.1}% ({downloaded} / {total} bytes)");
        }
        _ => print!("\r  [{stage}] {downloaded} bytes"),
    };
    server.setup(&progress).context("setup failed")?;
    println!();
    println!();

    if server.is_installed() {
        println!("Starting server to verify installation...");
        let cancel = AtomicBool::new(false);
        server.start(&cancel).context("server failed to start")?;
        println!("Server is healthy!");
        server.stop().context("server failed to stop")?;
    }

    println!();
    println!("Setup complete. Run 'palaver' to start.");
    Ok(())
}

fn run(debug: bool) -> Result<()> {
    let cfg_path = config::default_path();
    let cfg = config::load(&cfg_path).context("load config")?;
    cfg.validate().context("invalid config")?;

    warn_on_plaintext_endpoints(&cfg);

    let transcriber =
        new_transcriber(&cfg.transcription).context("create transcriber")?;
    let tones = ToneRegistry::with_custom(&cfg.custom_tones);
    let themes = ThemeSet::with_custom(&cfg.custom_themes);

    // A missing microphone degrades the session instead of ending it; the
    // panel shows the gap and presses surface a device error.
    let recorder = match Recorder::new(cfg.audio.max_duration_sec) {
        Ok(recorder) => Some(recorder),
        Err(err) => {
            log_debug("device", &format!("recorder unavailable: {err}"));
            None
        }
    };

    let registry = HotkeyRegistry::new();
    let mut listener = registry
        .create_listener(&cfg.hotkey)
        .context("create hotkey listener")?;
    let hotkey_label = listener.binding_label().to_string();
    log_debug("hotkey", &format!("bound: {hotkey_label}"));

    let server = if cfg.server.auto_start {
        let server = Server::new(&cfg.server, cfg.data_dir());
        if server.is_installed() {
            log_debug("server", "managed backend is installed, will auto-start");
            Some(Arc::new(server))
        } else {
            log_debug("server", "managed backend not installed (run 'palaver setup' first)");
            None
        }
    } else {
        None
    };

    let (hotkey_tx, hotkey_rx) = bounded(16);
    let (debug_tx, debug_rx) = bounded(256);
    if debug {
        set_log_sink(Some(debug_tx));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let listener_stop = stop.clone();
    let listener_thread = std::thread::spawn(move || {
        if let Err(err) = listener.run(hotkey_tx, listener_stop.clone()) {
            if !listener_stop.load(Ordering::Relaxed) {
                log_debug("hotkey", &format!("listener error: {err}"));
            }
        }
    });

    let mut app = App::new(
        cfg,
        cfg_path,
        transcriber,
        tones,
        Arc::new(SystemInjector),
        recorder,
        server,
        hotkey_label,
        debug,
    );
    if app.has_server() {
        app.start_server();
    }
    app.refresh_pp_models();

    let result = ui::run_app(&mut app, &themes, hotkey_rx, debug_rx);

    // Shutdown ordering: cancel the observer, stop capture, stop the
    // managed server.
    stop.store(true, Ordering::Relaxed);
    set_log_sink(None);
    app.shutdown();
    let _ = listener_thread.join();

    result
}

/// Shipping audio or transcripts over plaintext HTTP to a non-local host
/// deserves a loud line on stderr before the panel takes over.
fn warn_on_plaintext_endpoints(cfg: &Config) {
    if let Some(host) = insecure_http_host(&cfg.transcription.base_url) {
        eprintln!(
            "WARNING: transcription base_url uses plaintext HTTP to non-local host {host:?} — audio will be sent unencrypted"
        );
    }
    if cfg.post_processing.enabled {
        if let Some(host) = insecure_http_host(&cfg.post_processing.base_url) {
            eprintln!(
                "WARNING: post_processing base_url uses plaintext HTTP to non-local host {host:?} — transcripts will be sent unencrypted"
            );
        }
    }
}

/// The host of an `http://` URL when it is not loopback; None otherwise.
fn insecure_http_host(url: &str) -> Option<String> {
    let rest = url.strip_prefix("http://")?;
    let authority = rest.split(['/', '?']).next().unwrap_or("");
    let host = authority
        .rsplit_once('@')
        .map(|(_, h)| h)
        .unwrap_or(authority);
    let host = if let Some(stripped) = host.strip_prefix('[') {
        stripped.split(']').next().unwrap_or("")
    } else {
        host.split(':').next().unwrap_or("")
    };
    match host {
        "" | "localhost" | "127.0.0.1" | "::1" => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_hosts_are_fine() {
        assert_eq!(insecure_http_host("http://localhost:5092"), None);
        assert_eq!(insecure_http_host("http://127.0.0.1:5092/v1"), None);
        assert_eq!(insecure_http_host("http://[::1]:5092"), None);
        assert_eq!(insecure_http_host("https://example.com"), None);
    }

    #[test]
    fn remote_plaintext_hosts_are_flagged() {
        assert_eq!(
            insecure_http_host("http://stt.example.com:5092/v1"),
            Some("stt.example.com".to_string())
        );
        assert_eq!(
            insecure_http_host("http://10.0.0.7"),
            Some("10.0.0.7".to_string())
        );
    }
}
