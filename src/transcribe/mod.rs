//! Transcription providers behind one contract.
//!
//! `Transcribe` turns a WAV byte buffer into text. Providers may expose
//! optional capabilities through the accessor methods; the status projector
//! probes them and falls back gracefully when a capability is absent.

mod command;
mod openai;

pub use command::CommandTranscriber;
pub use openai::OpenAiTranscriber;

use crate::config::TranscriptionConfig;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("transcription request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("transcription failed (status {status}): {body}")]
    Status { status: u16, body: String },
    #[error("transcription command failed: {0}")]
    CommandFailed(String),
    #[error("transcription command timed out after {0}s")]
    CommandTimeout(u64),
    #[error("empty command after substitution")]
    EmptyCommand,
    #[error("unknown transcription provider: {0}")]
    UnknownProvider(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Backend liveness probe.
pub trait HealthCheck: Send + Sync {
    fn ping(&self) -> Result<(), TranscribeError>;
}

/// Lists model ids the backend is serving.
pub trait ModelLister: Send + Sync {
    fn list_models(&self) -> Result<Vec<String>, TranscribeError>;
}

/// A transcription provider. Capability accessors default to None; concrete
/// providers override the ones they implement.
pub trait Transcribe: Send + Sync {
    fn transcribe(&self, wav: &[u8]) -> Result<String, TranscribeError>;

    fn health(&self) -> Option<&dyn HealthCheck> {
        None
    }

    fn models(&self) -> Option<&dyn ModelLister> {
        None
    }

    fn configured_model(&self) -> Option<&str> {
        None
    }
}

/// Build the provider selected by `cfg.provider`.
pub fn new_transcriber(cfg: &TranscriptionConfig) -> Result<Arc<dyn Transcribe>, TranscribeError> {
    match cfg.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiTranscriber::new(
            &cfg.base_url,
            &cfg.model,
            cfg.timeout_sec,
            cfg.tls_skip_verify,
        )?)),
        "command" => {
            if cfg.command.is_empty() {
                return Err(TranscribeError::EmptyCommand);
            }
            Ok(Arc::new(CommandTranscriber::new(
                &cfg.command,
                cfg.timeout_sec,
            )))
        }
        other => Err(TranscribeError::UnknownProvider(other.to_string())),
    }
}

/// Strip trailing slashes so URL joins stay predictable.
pub(crate) fn normalized_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranscriptionConfig;

    #[test]
    fn factory_rejects_unknown_provider() {
        let mut cfg = TranscriptionConfig::default();
        cfg.provider = "carrier-pigeon".to_string();
        match new_transcriber(&cfg) {
            Err(TranscribeError::UnknownProvider(name)) => assert_eq!(name, "carrier-pigeon"),
            other => panic!("expected UnknownProvider, got {:?}", other.err()),
        }
    }

    #[test]
    fn factory_rejects_command_provider_without_template() {
        let mut cfg = TranscriptionConfig::default();
        cfg.provider = "command".to_string();
        assert!(matches!(
            new_transcriber(&cfg),
            Err(TranscribeError::EmptyCommand)
        ));
    }

    #[test]
    fn factory_builds_openai_with_capabilities() {
        let cfg = TranscriptionConfig::default();
        let t = new_transcriber(&cfg).unwrap();
        assert!(t.health().is_some());
        assert!(t.models().is_some());
        assert_eq!(t.configured_model(), Some("whisper-1"));
    }

    #[test]
    fn factory_builds_command_without_capabilities() {
        let mut cfg = TranscriptionConfig::default();
        cfg.provider = "command".to_string();
        cfg.command = "cat {input}".to_string();
        let t = new_transcriber(&cfg).unwrap();
        assert!(t.health().is_none());
        assert!(t.models().is_none());
        assert!(t.configured_model().is_none());
    }

    #[test]
    fn base_urls_lose_trailing_slashes() {
        assert_eq!(normalized_base("http://x:1/"), "http://x:1");
        assert_eq!(normalized_base("http://x:1///"), "http://x:1");
        assert_eq!(normalized_base("http://x:1"), "http://x:1");
    }
}
