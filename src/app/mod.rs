//! The coordinator: sequences capture, transcription, rewriting, and
//! injection, and owns every state transition.

mod job;
mod state;

pub(crate) use job::{poll_slot, spawn_job, Job, JobPoll};
pub use state::{App, ServerStateView, UiState};
