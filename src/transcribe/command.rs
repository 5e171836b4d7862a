//! Transcription by shelling out to a user-supplied command.
//!
//! The WAV bytes go to a uniquely named temp file; `{input}` in the
//! template is replaced with its path; the command runs under `sh -c` with
//! a deadline; trimmed stdout is the transcript. The temp file is removed
//! on every exit path, including command crashes and timeouts.

use super::{Transcribe, TranscribeError};
use crate::logging::log_debug;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub struct CommandTranscriber {
    template: String,
    timeout_sec: u64,
}

impl CommandTranscriber {
    pub fn new(template: &str, timeout_sec: u64) -> Self {
        Self {
            template: template.to_string(),
            timeout_sec,
        }
    }
}

impl Transcribe for CommandTranscriber {
    fn transcribe(&self, wav: &[u8]) -> Result<String, TranscribeError> {
        // NamedTempFile deletes on drop, which covers every return below.
        let mut tmp = tempfile::Builder::new()
            .prefix("palaver-")
            .suffix(".wav")
            .tempfile()?;
        tmp.write_all(wav)?;
        tmp.flush()?;
        let tmp_path = tmp.path().to_string_lossy().into_owned();

        let command = self.template.replace("{input}", &tmp_path);
        if command.trim().is_empty() {
            return Err(TranscribeError::EmptyCommand);
        }
        log_debug(
            "transcribe",
            &format!("command: {command} wav_size={}", wav.len()),
        );

        let start = Instant::now();
        let deadline = start + Duration::from_secs(self.timeout_sec);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TranscribeError::CommandFailed(format!("spawn sh: {e}")))?;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(TranscribeError::CommandTimeout(self.timeout_sec));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(TranscribeError::CommandFailed(format!("wait: {e}")));
                }
            }
        };

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            let _ = pipe.read_to_string(&mut stdout);
        }
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(TranscribeError::CommandFailed(format!(
                "exit {status}: {}",
                stderr.trim()
            )));
        }

        let text = stdout.trim().to_string();
        log_debug(
            "transcribe",
            &format!(
                "command done: output_size={} latency={}ms",
                stdout.len(),
                start.elapsed().as_millis()
            ),
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cat_returns_the_wav_bytes() {
        let t = CommandTranscriber::new("cat {input}", 10);
        let out = t.transcribe(b"test-wav-content").unwrap();
        assert_eq!(out, "test-wav-content");
    }

    #[test]
    fn stdout_is_trimmed() {
        let t = CommandTranscriber::new("echo '  hello world  '", 10);
        assert_eq!(t.transcribe(b"x").unwrap(), "hello world");
    }

    #[test]
    fn whitespace_template_is_rejected() {
        let t = CommandTranscriber::new("   ", 10);
        assert!(matches!(
            t.transcribe(b"x"),
            Err(TranscribeError::EmptyCommand)
        ));
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let t = CommandTranscriber::new("echo oops >&2; exit 3", 10);
        match t.transcribe(b"x") {
            Err(TranscribeError::CommandFailed(msg)) => {
                assert!(msg.contains("oops"), "stderr missing from {msg:?}");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn deadline_kills_slow_commands() {
        let t = CommandTranscriber::new("sleep 30", 1);
        let start = Instant::now();
        assert!(matches!(
            t.transcribe(b"x"),
            Err(TranscribeError::CommandTimeout(1))
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn temp_file_is_gone_after_success_and_failure() {
        // Capture the substituted path, then verify it is removed.
        let t = CommandTranscriber::new("echo {input}", 10);
        let path = t.transcribe(b"x").unwrap();
        assert!(!path.is_empty());
        assert!(
            !std::path::Path::new(&path).exists(),
            "temp file {path} survived"
        );

        let t = CommandTranscriber::new("echo {input}; exit 1", 10);
        assert!(t.transcribe(b"x").is_err());
    }
}
