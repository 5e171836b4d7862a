//! Palaver: push-to-talk dictation for the desktop.
//!
//! Hold a global hotkey to capture microphone audio; on release the take is
//! downmixed, resampled, WAV-encoded, transcribed by an OpenAI-compatible
//! backend (or an arbitrary command), optionally rewritten by a local LLM
//! tone filter, and injected into whichever application has keyboard focus.
//! A small terminal panel shows state and a few toggles.

pub mod app;
pub mod audio;
pub mod config;
pub mod hotkey;
pub mod inject;
pub mod logging;
pub mod postprocess;
pub mod server;
pub mod status;
pub mod transcribe;
pub mod ui;
