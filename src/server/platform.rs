//! Per-platform knowledge about the managed transcription backend.
//!
//! Linux runs a downloaded Parakeet binary against bundled ONNX Runtime;
//! macOS runs `whisper-server` from PATH (brew install whisper-cpp) with a
//! downloaded ggml model. Everything the supervisor needs to know about
//! either lives here.

use std::path::Path;
use std::time::Duration;

#[cfg(target_os = "linux")]
pub(super) mod imp {
    use super::*;
    use std::path::PathBuf;
    use std::process::Command;

    pub const ONNX_RUNTIME_VERSION: &str = "1.24.2";

    pub fn server_binary_name() -> &'static str {
        "parakeet"
    }

    pub fn binary_url() -> String {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        format!(
            "https://github.com/achetronic/parakeet/releases/latest/download/parakeet-linux-{arch}"
        )
    }

    /// filename → download URL for the INT8-quantized Parakeet TDT 0.6B v2
    /// ONNX model files.
    pub fn model_urls() -> Vec<(&'static str, String)> {
        let base = "https://huggingface.co/istupakov/parakeet-tdt-0.6b-v2-onnx/resolve/main";
        [
            "config.json",
            "vocab.txt",
            "encoder-model.int8.onnx",
            "decoder_joint-model.int8.onnx",
        ]
        .into_iter()
        .map(|name| (name, format!("{base}/{name}")))
        .collect()
    }

    pub fn onnx_runtime_url() -> String {
        format!(
            "https://github.com/microsoft/onnxruntime/releases/download/v{v}/onnxruntime-linux-x64-{v}.tgz",
            v = ONNX_RUNTIME_VERSION
        )
    }

    pub fn is_installed(binary_path: &Path, models_dir: &Path, aux_lib_dir: &Path) -> bool {
        binary_path.exists()
            && models_dir.join("encoder-model.int8.onnx").exists()
            && onnx_runtime_available(aux_lib_dir)
    }

    /// Bundled copy first, then a system-wide install via ldconfig.
    pub fn onnx_runtime_available(aux_lib_dir: &Path) -> bool {
        if let Ok(entries) = std::fs::read_dir(aux_lib_dir) {
            for entry in entries.flatten() {
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("libonnxruntime.so")
                {
                    return true;
                }
            }
        }
        Command::new("ldconfig")
            .arg("-p")
            .output()
            .map(|out| String::from_utf8_lossy(&out.stdout).contains("libonnxruntime.so"))
            .unwrap_or(false)
    }

    pub fn server_args(port: u16, models_dir: &Path) -> Vec<String> {
        vec![
            "-port".to_string(),
            port.to_string(),
            "-models".to_string(),
            models_dir.to_string_lossy().into_owned(),
        ]
    }

    /// ONNXRUNTIME_LIB points straight at the bundled library; the
    /// LD_LIBRARY_PATH prepend is the fallback for the dynamic linker.
    pub fn server_env(aux_lib_dir: &Path) -> Vec<(String, String)> {
        let onnx_lib: PathBuf = aux_lib_dir.join("libonnxruntime.so");
        let ld_path = std::env::var("LD_LIBRARY_PATH").unwrap_or_default();
        vec![
            (
                "ONNXRUNTIME_LIB".to_string(),
                onnx_lib.to_string_lossy().into_owned(),
            ),
            (
                "LD_LIBRARY_PATH".to_string(),
                format!("{}:{ld_path}", aux_lib_dir.to_string_lossy()),
            ),
        ]
    }

    pub fn health_url(port: u16) -> String {
        format!("http://localhost:{port}/v1/models")
    }

    /// Model loading is slow; give it two minutes.
    pub fn startup_deadline() -> Duration {
        Duration::from_secs(120)
    }

    /// ELF magic: 0x7f 'E' 'L' 'F'.
    pub fn binary_magic_ok(magic: &[u8; 4]) -> bool {
        magic == &[0x7f, b'E', b'L', b'F']
    }
}

#[cfg(target_os = "macos")]
pub(super) mod imp {
    use super::*;

    pub fn server_binary_name() -> &'static str {
        "whisper-server"
    }

    pub fn model_url() -> String {
        "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin".to_string()
    }

    pub fn is_installed(binary_path: &Path, models_dir: &Path, _aux_lib_dir: &Path) -> bool {
        let binary_ok = binary_path.exists() || on_path("whisper-server");
        binary_ok && models_dir.join("ggml-base.en.bin").exists()
    }

    pub fn on_path(name: &str) -> bool {
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        std::env::split_paths(&path_var).any(|dir| dir.join(name).is_file())
    }

    pub fn server_args(port: u16, models_dir: &Path) -> Vec<String> {
        vec![
            "--model".to_string(),
            models_dir
                .join("ggml-base.en.bin")
                .to_string_lossy()
                .into_owned(),
            "--port".to_string(),
            port.to_string(),
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--inference-path".to_string(),
            "/v1/audio/transcriptions".to_string(),
            "--language".to_string(),
            "en".to_string(),
            "--no-timestamps".to_string(),
        ]
    }

    pub fn server_env(_aux_lib_dir: &Path) -> Vec<(String, String)> {
        Vec::new()
    }

    pub fn health_url(port: u16) -> String {
        format!("http://localhost:{port}/")
    }

    pub fn startup_deadline() -> Duration {
        Duration::from_secs(30)
    }

    /// Mach-O magic: 64-bit, 32-bit, or universal, either endianness.
    pub fn binary_magic_ok(magic: &[u8; 4]) -> bool {
        matches!(
            magic,
            [0xCF, 0xFA, 0xED, 0xFE]
                | [0xCE, 0xFA, 0xED, 0xFE]
                | [0xCA, 0xFE, 0xBA, 0xBE]
                | [0xBE, 0xBA, 0xFE, 0xCA]
        )
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub(super) mod imp {
    use super::*;

    pub fn server_binary_name() -> &'static str {
        "palaver-backend"
    }

    pub fn is_installed(_binary_path: &Path, _models_dir: &Path, _aux_lib_dir: &Path) -> bool {
        false
    }

    pub fn server_args(_port: u16, _models_dir: &Path) -> Vec<String> {
        Vec::new()
    }

    pub fn server_env(_aux_lib_dir: &Path) -> Vec<(String, String)> {
        Vec::new()
    }

    pub fn health_url(port: u16) -> String {
        format!("http://localhost:{port}/")
    }

    pub fn startup_deadline() -> Duration {
        Duration::from_secs(30)
    }

    pub fn binary_magic_ok(_magic: &[u8; 4]) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    #[cfg(target_os = "linux")]
    #[test]
    fn linux_health_url_probes_models_endpoint() {
        assert_eq!(
            super::imp::health_url(5092),
            "http://localhost:5092/v1/models"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn elf_magic_is_recognized() {
        assert!(super::imp::binary_magic_ok(&[0x7f, b'E', b'L', b'F']));
        assert!(!super::imp::binary_magic_ok(&[0, 0, 0, 0]));
        assert!(!super::imp::binary_magic_ok(b"#!/b"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn model_urls_cover_the_required_artifacts() {
        let urls = super::imp::model_urls();
        let names: Vec<_> = urls.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"encoder-model.int8.onnx"));
        assert!(names.contains(&"decoder_joint-model.int8.onnx"));
        assert!(names.contains(&"vocab.txt"));
        assert!(names.contains(&"config.json"));
    }
}
