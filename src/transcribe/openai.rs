//! OpenAI-compatible transcription over HTTP multipart.

use super::{normalized_base, HealthCheck, ModelLister, Transcribe, TranscribeError};
use crate::logging::log_debug;
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::time::{Duration, Instant};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct OpenAiTranscriber {
    base_url: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl OpenAiTranscriber {
    pub fn new(
        base_url: &str,
        model: &str,
        timeout_sec: u64,
        tls_skip_verify: bool,
    ) -> Result<Self, TranscribeError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(tls_skip_verify)
            .build()?;
        Ok(Self {
            base_url: normalized_base(base_url),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_sec),
            client,
        })
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl Transcribe for OpenAiTranscriber {
    /// POST the WAV as multipart form data; the trimmed response body is
    /// the transcript.
    fn transcribe(&self, wav: &[u8]) -> Result<String, TranscribeError> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        log_debug(
            "transcribe",
            &format!("request: POST {url} wav_size={}", wav.len()),
        );

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(wav.to_vec()).file_name("audio.wav"),
            )
            .text("model", self.model.clone())
            .text("response_format", "text");

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.timeout)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        log_debug(
            "transcribe",
            &format!(
                "response: status={} body_size={} latency={}ms",
                status.as_u16(),
                body.len(),
                start.elapsed().as_millis()
            ),
        );

        if !status.is_success() {
            return Err(TranscribeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body.trim().to_string())
    }

    fn health(&self) -> Option<&dyn HealthCheck> {
        Some(self)
    }

    fn models(&self) -> Option<&dyn ModelLister> {
        Some(self)
    }

    fn configured_model(&self) -> Option<&str> {
        Some(&self.model)
    }
}

impl HealthCheck for OpenAiTranscriber {
    /// Any response at all counts as alive; the endpoint's root may well 404.
    fn ping(&self) -> Result<(), TranscribeError> {
        self.client
            .get(format!("{}/", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()?;
        Ok(())
    }
}

impl ModelLister for OpenAiTranscriber {
    fn list_models(&self) -> Result<Vec<String>, TranscribeError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranscribeError::Status {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        let models: ModelsResponse = response.json()?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}
