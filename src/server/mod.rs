//! Supervisor for the optional local transcription backend.
//!
//! Owns the child process exclusively: download → verify → spawn →
//! health-check → signal-terminate. All operations serialize through one
//! mutex; starting twice without stopping is a hard error.

mod download;
mod platform;

pub use download::ProgressFn;

use crate::config::ServerConfig;
use crate::logging::log_debug;
use download::{download_and_extract_lib_archive, download_client, download_file};
use platform::imp;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server already running (pid {0})")]
    AlreadyRunning(u32),
    #[error("download {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("downloaded binary is invalid: {0}")]
    InvalidBinary(String),
    #[error("archive extraction failed: {0}")]
    Archive(String),
    #[error("spawn {0}: {1}")]
    SpawnFailed(String, std::io::Error),
    #[error("backend did not become healthy within {0:?}")]
    NotHealthy(Duration),
    #[error("start cancelled")]
    Cancelled,
    #[error("backend is not installed (run 'palaver setup' first)")]
    NotInstalled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Managed backend server. One instance per process; the child handle
/// lives behind the mutex.
pub struct Server {
    binary_path: PathBuf,
    models_dir: PathBuf,
    aux_lib_dir: PathBuf,
    port: u16,
    child: Mutex<Option<Child>>,
}

impl Server {
    pub fn new(cfg: &ServerConfig, data_dir: PathBuf) -> Self {
        Self {
            binary_path: data_dir.join(imp::server_binary_name()),
            models_dir: data_dir.join("models"),
            aux_lib_dir: data_dir.join("onnxruntime"),
            port: cfg.port,
            child: Mutex::new(None),
        }
    }

    /// True when the binary, model files, and any auxiliary libraries are
    /// all present.
    pub fn is_installed(&self) -> bool {
        imp::is_installed(&self.binary_path, &self.models_dir, &self.aux_lib_dir)
    }

    /// Download whatever is missing. Idempotent: artifacts already at their
    /// destination are skipped.
    pub fn setup(&self, progress: ProgressFn) -> Result<(), ServerError> {
        let client = download_client()?;
        self.setup_with_client(&client, progress)
    }

    #[cfg(target_os = "linux")]
    fn setup_with_client(
        &self,
        client: &reqwest::blocking::Client,
        progress: ProgressFn,
    ) -> Result<(), ServerError> {
        if !self.binary_path.exists() {
            log_debug("server", "downloading parakeet binary");
            let digest = download_file(
                client,
                &imp::binary_url(),
                &self.binary_path,
                progress,
                "binary",
            )?;
            log_debug("server", &format!("binary SHA256: {digest}"));
            if let Err(err) = verify_binary(&self.binary_path) {
                let _ = fs::remove_file(&self.binary_path);
                return Err(err);
            }
            make_executable(&self.binary_path)?;
        }

        for (filename, url) in imp::model_urls() {
            let dest = self.models_dir.join(filename);
            if dest.exists() {
                continue;
            }
            log_debug("server", &format!("downloading model file: {filename}"));
            let digest = download_file(client, &url, &dest, progress, filename)?;
            log_debug("server", &format!("{filename} SHA256: {digest}"));
        }

        if !imp::onnx_runtime_available(&self.aux_lib_dir) {
            log_debug(
                "server",
                &format!("downloading ONNX Runtime {}", imp::ONNX_RUNTIME_VERSION),
            );
            download_and_extract_lib_archive(
                client,
                &imp::onnx_runtime_url(),
                &self.aux_lib_dir,
                progress,
                "onnxruntime",
            )?;
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn setup_with_client(
        &self,
        client: &reqwest::blocking::Client,
        progress: ProgressFn,
    ) -> Result<(), ServerError> {
        if !imp::on_path("whisper-server") {
            return Err(ServerError::InvalidBinary(
                "whisper-server not found: install with 'brew install whisper-cpp'".to_string(),
            ));
        }
        let dest = self.models_dir.join("ggml-base.en.bin");
        if !dest.exists() {
            log_debug("server", "downloading whisper model: ggml-base.en.bin");
            let digest =
                download_file(client, &imp::model_url(), &dest, progress, "ggml-base.en.bin")?;
            log_debug("server", &format!("model SHA256: {digest}"));
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn setup_with_client(
        &self,
        _client: &reqwest::blocking::Client,
        _progress: ProgressFn,
    ) -> Result<(), ServerError> {
        Err(ServerError::NotInstalled)
    }

    /// Spawn the backend and poll its readiness URL until it answers 200 or
    /// the platform deadline passes. `cancel` aborts the wait immediately.
    pub fn start(&self, cancel: &AtomicBool) -> Result<(), ServerError> {
        let mut guard = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(child) = guard.as_mut() {
            if process_alive(child) {
                return Err(ServerError::AlreadyRunning(child.id()));
            }
            *guard = None;
        }
        if !self.is_installed() {
            return Err(ServerError::NotInstalled);
        }

        let binary = resolve_binary(&self.binary_path);
        log_debug(
            "server",
            &format!("starting {} on port {}", binary.display(), self.port),
        );
        let mut cmd = Command::new(&binary);
        cmd.args(imp::server_args(self.port, &self.models_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in imp::server_env(&self.aux_lib_dir) {
            cmd.env(key, value);
        }
        let child = cmd
            .spawn()
            .map_err(|e| ServerError::SpawnFailed(binary.display().to_string(), e))?;
        *guard = Some(child);

        let deadline = Instant::now() + imp::startup_deadline();
        let probe = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        let url = imp::health_url(self.port);
        while Instant::now() < deadline {
            if cancel.load(Ordering::Relaxed) {
                return Err(ServerError::Cancelled);
            }
            std::thread::sleep(HEALTH_POLL_INTERVAL);
            match probe.get(&url).send() {
                Ok(response) if response.status().is_success() => {
                    log_debug("server", "backend is ready");
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(ServerError::NotHealthy(imp::startup_deadline()))
    }

    /// Graceful SIGINT, ≤5 s wait, then SIGKILL. Always reaps the child.
    pub fn stop(&self) -> Result<(), ServerError> {
        let mut guard = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(mut child) = guard.take() else {
            return Ok(());
        };
        log_debug("server", &format!("stopping backend (pid {})", child.id()));

        interrupt(&child);
        let deadline = Instant::now() + STOP_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ServerError::Io(err));
                }
            }
        }
    }

    /// Liveness probe via signal zero.
    pub fn running(&self) -> bool {
        let mut guard = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_mut().map(process_alive).unwrap_or(false)
    }

    pub fn restart(&self, cancel: &AtomicBool) -> Result<(), ServerError> {
        if let Err(err) = self.stop() {
            log_debug("server", &format!("stop error during restart: {err}"));
        }
        self.start(cancel)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// The data-dir binary when present, otherwise the bare name so PATH
/// resolution applies (macOS whisper-server from brew).
fn resolve_binary(binary_path: &Path) -> PathBuf {
    if binary_path.exists() {
        binary_path.to_path_buf()
    } else {
        PathBuf::from(imp::server_binary_name())
    }
}

#[cfg(unix)]
fn interrupt(child: &Child) {
    // SIGINT first; the backends shut down cleanly on it.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGINT);
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) {}

#[cfg(unix)]
fn process_alive(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(Some(_)) => false,
        Ok(None) => unsafe { libc::kill(child.id() as libc::pid_t, 0) == 0 },
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn process_alive(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(None))
}

/// Magic-byte check on a downloaded executable.
#[cfg_attr(not(any(target_os = "linux", test)), allow(dead_code))]
fn verify_binary(path: &Path) -> Result<(), ServerError> {
    let mut file = fs::File::open(path)?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .map_err(|e| ServerError::InvalidBinary(format!("read magic bytes: {e}")))?;
    if !imp::binary_magic_ok(&magic) {
        return Err(ServerError::InvalidBinary(format!(
            "unexpected magic bytes {magic:02x?}"
        )));
    }
    Ok(())
}

#[cfg(unix)]
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn make_executable(path: &Path) -> Result<(), ServerError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), ServerError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn test_server(dir: &Path) -> Server {
        Server::new(
            &ServerConfig {
                auto_start: false,
                data_dir: String::new(),
                port: 5092,
            },
            dir.to_path_buf(),
        )
    }

    #[test]
    fn fresh_data_dir_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path());
        assert!(!server.is_installed());
    }

    #[test]
    fn start_without_install_errors() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path());
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            server.start(&cancel),
            Err(ServerError::NotInstalled)
        ));
    }

    #[test]
    fn stop_without_start_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path());
        assert!(server.stop().is_ok());
        assert!(!server.running());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn verify_binary_rejects_scripts_and_accepts_elf() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script");
        fs::write(&script, b"#!/bin/sh\necho hi\n").unwrap();
        assert!(verify_binary(&script).is_err());

        let elf = dir.path().join("elf");
        fs::write(&elf, [0x7f, b'E', b'L', b'F', 2, 1, 1, 0]).unwrap();
        assert!(verify_binary(&elf).is_ok());
    }

    #[test]
    fn verify_binary_rejects_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("stub");
        fs::write(&stub, [0x7f]).unwrap();
        assert!(verify_binary(&stub).is_err());
    }
}
