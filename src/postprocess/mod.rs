//! Optional LLM rewrite of transcripts, steered by tone presets.

mod llm;

pub use llm::LlmPostProcessor;

use crate::config::{CustomTone, PostProcessingConfig};
use crate::logging::log_debug;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("post-processing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("post-processing failed (status {status}): {body}")]
    Status { status: u16, body: String },
    #[error("malformed post-processing response: {0}")]
    Decode(String),
    #[error("no choices in response")]
    NoChoices,
}

/// Rewrites transcribed text; implementations must be cheap to call when
/// they have nothing to do.
pub trait PostProcess: Send + Sync {
    fn rewrite(&self, text: &str) -> Result<String, PostProcessError>;

    fn models(&self) -> Option<&dyn crate::transcribe::ModelLister> {
        None
    }
}

/// Pass-through used whenever post-processing is off.
pub struct NoopPostProcessor;

impl PostProcess for NoopPostProcessor {
    fn rewrite(&self, text: &str) -> Result<String, PostProcessError> {
        Ok(text.to_string())
    }
}

/// A tone preset: the system prompt that steers the rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tone {
    pub name: String,
    pub prompt: String,
}

const FORMAL_PROMPT: &str = "You are a post-processor for speech-to-text transcription. Rewrite the transcribed text in a professional, formal tone suitable for business communication. Remove filler words and false starts. Preserve all specific terms, names, technical words, and instructions exactly as spoken. Return only the rewritten text.";

const DIRECT_PROMPT: &str = "You are a post-processor for speech-to-text transcription. Rewrite the transcribed text to be concise and direct. Remove all filler words (um, uh, like, you know, so, basically, actually, I mean, kind of, sort of), false starts, and redundant phrasing. Preserve all specific terms, names, technical words, and instructions exactly as spoken. Return only the rewritten text.";

const TOKEN_EFFICIENT_PROMPT: &str = "You are a post-processor for speech-to-text transcription. Compress the transcribed speech into concise text while preserving the speaker's original intent and meaning. Rules: 1) Remove ALL filler words, hedging, false starts, and conversational padding. 2) Use imperative form where the speaker is giving commands. 3) Strip unnecessary articles, pronouns, and linking phrases. 4) If the speaker listed steps or numbered instructions, preserve that structure. 5) Preserve all technical terms, names, code references, and specific values exactly. 6) Do NOT add information, steps, or details the speaker did not say. 7) Do NOT interpret or expand on what the speaker meant. Return only the compressed text.";

/// Tone presets plus their cycle order. Built once at startup from the
/// built-ins and the user's `[[custom_tone]]` entries, then treated as
/// read-only.
#[derive(Debug, Clone)]
pub struct ToneRegistry {
    tones: HashMap<String, Tone>,
    order: Vec<String>,
}

impl ToneRegistry {
    /// Built-in presets only; "off" is always position zero of the cycle.
    pub fn builtin() -> Self {
        let mut registry = Self {
            tones: HashMap::new(),
            order: Vec::new(),
        };
        for (name, prompt) in [
            ("off", ""),
            ("formal", FORMAL_PROMPT),
            ("direct", DIRECT_PROMPT),
            ("token-efficient", TOKEN_EFFICIENT_PROMPT),
        ] {
            registry.tones.insert(
                name.to_string(),
                Tone {
                    name: name.to_string(),
                    prompt: prompt.to_string(),
                },
            );
            registry.order.push(name.to_string());
        }
        registry
    }

    /// Built-ins plus user tones. A user tone named like a built-in
    /// replaces its prompt (with a note) without duplicating the cycle slot.
    pub fn with_custom(custom: &[CustomTone]) -> Self {
        let mut registry = Self::builtin();
        for tone in custom {
            let key = tone.name.to_lowercase();
            if key.is_empty() {
                continue;
            }
            if registry.tones.contains_key(&key) && registry.order.contains(&key) {
                log_debug(
                    "config",
                    &format!("custom tone {key:?} overrides built-in default"),
                );
            }
            registry.tones.insert(
                key.clone(),
                Tone {
                    name: tone.name.clone(),
                    prompt: tone.prompt.clone(),
                },
            );
            if !registry.order.contains(&key) {
                registry.order.push(key);
            }
        }
        registry
    }

    /// Case-insensitive lookup; unknown names resolve to "off".
    pub fn resolve(&self, name: &str) -> &Tone {
        self.tones
            .get(&name.to_lowercase())
            .unwrap_or_else(|| &self.tones["off"])
    }

    /// The name after `current` in the cycle, wrapping at the end. Unknown
    /// names restart the cycle at position zero.
    pub fn next_tone(&self, current: &str) -> &str {
        let current = current.to_lowercase();
        match self.order.iter().position(|n| *n == current) {
            Some(i) => &self.order[(i + 1) % self.order.len()],
            None => &self.order[0],
        }
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }
}

/// Build the post-processor for the current config: a no-op whenever
/// post-processing is disabled, the tone is "off", or its prompt is empty.
pub fn new_post_processor(
    cfg: &PostProcessingConfig,
    tones: &ToneRegistry,
) -> Arc<dyn PostProcess> {
    if !cfg.enabled || cfg.tone.to_lowercase() == "off" {
        return Arc::new(NoopPostProcessor);
    }
    let tone = tones.resolve(&cfg.tone);
    if tone.prompt.is_empty() {
        return Arc::new(NoopPostProcessor);
    }
    Arc::new(LlmPostProcessor::new(
        &cfg.base_url,
        &cfg.model,
        &tone.prompt,
        cfg.timeout_sec,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_is_position_zero_with_empty_prompt() {
        let reg = ToneRegistry::builtin();
        assert_eq!(reg.names()[0], "off");
        assert_eq!(reg.resolve("off").prompt, "");
    }

    #[test]
    fn cycle_wraps_after_full_rotation() {
        let reg = ToneRegistry::builtin();
        let mut name = "off".to_string();
        for _ in 0..reg.names().len() {
            name = reg.next_tone(&name).to_string();
        }
        assert_eq!(name, "off");
    }

    #[test]
    fn unknown_names_resolve_to_off() {
        let reg = ToneRegistry::builtin();
        assert_eq!(reg.resolve("sarcastic").name, "off");
        assert_eq!(reg.next_tone("sarcastic"), "off");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = ToneRegistry::builtin();
        assert_eq!(reg.resolve("FORMAL").name, "formal");
        assert_eq!(reg.next_tone("Formal"), "direct");
    }

    #[test]
    fn custom_tones_append_to_cycle() {
        let custom = vec![CustomTone {
            name: "pirate".to_string(),
            prompt: "Arr.".to_string(),
        }];
        let reg = ToneRegistry::with_custom(&custom);
        assert_eq!(reg.names().last().map(String::as_str), Some("pirate"));
        assert_eq!(reg.resolve("Pirate").prompt, "Arr.");
        assert_eq!(reg.next_tone("token-efficient"), "pirate");
        assert_eq!(reg.next_tone("pirate"), "off");
    }

    #[test]
    fn custom_override_replaces_prompt_without_duplicating_cycle() {
        let custom = vec![CustomTone {
            name: "Formal".to_string(),
            prompt: "Be stiff.".to_string(),
        }];
        let reg = ToneRegistry::with_custom(&custom);
        assert_eq!(reg.resolve("formal").prompt, "Be stiff.");
        assert_eq!(
            reg.names().iter().filter(|n| *n == "formal").count(),
            1,
            "override must not duplicate the cycle entry"
        );
    }

    #[test]
    fn empty_custom_names_are_skipped() {
        let custom = vec![CustomTone {
            name: String::new(),
            prompt: "x".to_string(),
        }];
        let reg = ToneRegistry::with_custom(&custom);
        assert_eq!(reg.names().len(), 4);
    }

    #[test]
    fn factory_returns_noop_when_disabled_or_off() {
        let tones = ToneRegistry::builtin();
        let mut cfg = PostProcessingConfig::default();
        cfg.enabled = false;
        cfg.tone = "formal".to_string();
        assert_eq!(
            new_post_processor(&cfg, &tones).rewrite("x").unwrap(),
            "x"
        );

        cfg.enabled = true;
        cfg.tone = "off".to_string();
        assert_eq!(
            new_post_processor(&cfg, &tones).rewrite("y").unwrap(),
            "y"
        );
    }

    #[test]
    fn factory_returns_noop_for_empty_custom_prompt() {
        let custom = vec![CustomTone {
            name: "hollow".to_string(),
            prompt: String::new(),
        }];
        let tones = ToneRegistry::with_custom(&custom);
        let mut cfg = PostProcessingConfig::default();
        cfg.enabled = true;
        cfg.tone = "hollow".to_string();
        assert_eq!(
            new_post_processor(&cfg, &tones).rewrite("z").unwrap(),
            "z"
        );
    }
}
