//! Chat-completions rewriter against an OpenAI-compatible endpoint.

use super::{PostProcess, PostProcessError};
use crate::logging::log_debug;
use crate::transcribe::{normalized_base, ModelLister, TranscribeError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::{Duration, Instant};

/// Cap on response bodies; a rewrite of dictated speech has no business
/// being larger than this.
const MAX_RESPONSE_BYTES: u64 = 1 << 20;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct LlmPostProcessor {
    base_url: String,
    model: String,
    prompt: String,
    timeout: Duration,
    client: Client,
}

impl LlmPostProcessor {
    pub fn new(base_url: &str, model: &str, prompt: &str, timeout_sec: u64) -> Self {
        Self {
            base_url: normalized_base(base_url),
            model: model.to_string(),
            prompt: prompt.to_string(),
            timeout: Duration::from_secs(timeout_sec),
            client: Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
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

impl PostProcess for LlmPostProcessor {
    fn rewrite(&self, text: &str) -> Result<String, PostProcessError> {
        let url = format!("{}/chat/completions", self.base_url);
        log_debug(
            "transcribe",
            &format!("postprocess: POST {url} model={} text_len={}", self.model, text.len()),
        );
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()?;
        let status = response.status();

        let mut body = String::new();
        response
            .take(MAX_RESPONSE_BYTES)
            .read_to_string(&mut body)
            .map_err(|e| PostProcessError::Decode(e.to_string()))?;
        log_debug(
            "transcribe",
            &format!(
                "postprocess: status={} body_size={} latency={}ms",
                status.as_u16(),
                body.len(),
                start.elapsed().as_millis()
            ),
        );

        if !status.is_success() {
            return Err(PostProcessError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| PostProcessError::Decode(e.to_string()))?;
        let first = parsed.choices.into_iter().next().ok_or(PostProcessError::NoChoices)?;
        Ok(first.message.content.trim().to_string())
    }

    fn models(&self) -> Option<&dyn ModelLister> {
        Some(self)
    }
}

impl ModelLister for LlmPostProcessor {
    fn list_models(&self) -> Result<Vec<String>, TranscribeError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_to_the_wire_shape() {
        let request = ChatRequest {
            model: "llama3",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "rewrite",
                },
                ChatMessage {
                    role: "user",
                    content: "hello",
                },
            ],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn chat_response_decodes_first_choice() {
        let body = r#"{"choices":[{"message":{"content":"  Rewritten.  "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "  Rewritten.  ");
    }

    #[test]
    fn empty_choices_decode_to_empty_vec() {
        let parsed: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.choices.is_empty());
    }
}
