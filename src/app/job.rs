//! One-shot worker jobs polled from the UI loop.
//!
//! Each pipeline stage runs on its own short-lived thread and reports one
//! value through a rendezvous channel. The UI loop polls without blocking
//! and joins the thread as soon as it has reported, so no handles linger.

use std::sync::mpsc::{self, TryRecvError};
use std::thread::{self, JoinHandle};

pub(crate) struct Job<T> {
    receiver: mpsc::Receiver<T>,
    handle: Option<JoinHandle<()>>,
}

pub(crate) enum JobPoll<T> {
    Pending,
    Done(T),
    /// The worker hung up without reporting (panic); callers surface this
    /// instead of waiting forever.
    Died,
}

pub(crate) fn spawn_job<T, F>(work: F) -> Job<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let handle = thread::spawn(move || {
        let _ = tx.send(work());
    });
    Job {
        receiver: rx,
        handle: Some(handle),
    }
}

impl<T> Job<T> {
    pub(crate) fn poll(&mut self) -> JobPoll<T> {
        match self.receiver.try_recv() {
            Ok(value) => {
                self.join();
                JobPoll::Done(value)
            }
            Err(TryRecvError::Empty) => JobPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                self.join();
                JobPoll::Died
            }
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Poll an optional job slot; on completion the slot is cleared and the
/// result handed to the caller.
pub(crate) fn poll_slot<T>(slot: &mut Option<Job<T>>) -> Option<JobPoll<T>> {
    let job = slot.as_mut()?;
    match job.poll() {
        JobPoll::Pending => None,
        done => {
            *slot = None;
            Some(done)
        }
    }
}
