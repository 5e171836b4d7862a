//! Periodic mic/backend/model probe for the status panel.

use crate::audio::{mic_available, mic_name};
use crate::transcribe::Transcribe;
use std::sync::Arc;

/// What the panel shows about the outside world.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub mic_available: bool,
    pub mic_device_name: String,
    pub backend_alive: bool,
    pub model_name: String,
}

/// Assemble a snapshot. Blocking (two short HTTP probes at most); callers
/// run it on a worker thread. Capabilities the provider lacks degrade to
/// the next source: ListModels → ConfiguredModel → "n/a".
pub fn collect_status(transcriber: &Arc<dyn Transcribe>) -> StatusSnapshot {
    let mic_ok = mic_available();
    let mic_device_name = if mic_ok { mic_name() } else { String::new() };

    let backend_alive = transcriber
        .health()
        .map(|h| h.ping().is_ok())
        .unwrap_or(false);

    let mut model_name = String::new();
    if backend_alive {
        if let Some(lister) = transcriber.models() {
            if let Ok(models) = lister.list_models() {
                if let Some(first) = models.into_iter().next() {
                    model_name = first;
                }
            }
        }
        if model_name.is_empty() {
            if let Some(configured) = transcriber.configured_model() {
                model_name = configured.to_string();
            }
        }
    }
    if model_name.is_empty() {
        model_name = "n/a".to_string();
    }

    StatusSnapshot {
        mic_available: mic_ok,
        mic_device_name,
        backend_alive,
        model_name,
    }
}
