//! Debug logging that stays out of the TUI's way.
//!
//! With `--debug`, every component logs one-line entries of the form
//! `[DEBUG] HH:MM:SS.ffffff <category> <message>`. While the status panel
//! owns the terminal the entries are routed into its debug pane through a
//! channel instead of stderr, so the alternate screen is never corrupted.

use chrono::Local;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_SINK: OnceLock<Mutex<Option<Sender<DebugEntry>>>> = OnceLock::new();

/// One structured debug line, ready for the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEntry {
    pub time: String,
    pub category: String,
    pub message: String,
}

fn sink() -> &'static Mutex<Option<Sender<DebugEntry>>> {
    LOG_SINK.get_or_init(|| Mutex::new(None))
}

/// Turn debug logging on or off for the process.
pub fn init_logging(enabled: bool) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn logging_enabled() -> bool {
    LOG_ENABLED.load(Ordering::Relaxed)
}

/// Route entries into the TUI debug panel instead of stderr. Pass `None`
/// when the panel goes away to restore stderr output.
pub fn set_log_sink(tx: Option<Sender<DebugEntry>>) {
    let mut guard = sink().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = tx;
}

/// Log one debug line under a category (`hotkey`, `paste`, `transcribe`,
/// `recorder`, `audio`, `device`, `server`, `config`, `debug`).
pub fn log_debug(category: &str, msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let time = Local::now().format("%H:%M:%S%.6f").to_string();
    let guard = sink().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(tx) = guard.as_ref() {
        // Dropped entries are acceptable; a full panel queue must not block a worker.
        let _ = tx.try_send(DebugEntry {
            time,
            category: category.to_string(),
            message: msg.to_string(),
        });
    } else {
        eprintln!("[DEBUG] {time} {category} {msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::{Mutex as StdMutex, OnceLock as StdOnceLock};

    // The logger is process-wide state; serialize the tests that flip it.
    fn guard() -> std::sync::MutexGuard<'static, ()> {
        static GUARD: StdOnceLock<StdMutex<()>> = StdOnceLock::new();
        GUARD
            .get_or_init(|| StdMutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn disabled_logger_sends_nothing() {
        let _guard = guard();
        init_logging(false);
        let (tx, rx) = bounded(64);
        set_log_sink(Some(tx));
        log_debug("logging-test-off", "ignored");
        let leaked = rx
            .try_iter()
            .any(|entry| entry.category == "logging-test-off");
        set_log_sink(None);
        assert!(!leaked);
    }

    #[test]
    fn sink_receives_structured_entries() {
        let _guard = guard();
        init_logging(true);
        let (tx, rx) = bounded(64);
        set_log_sink(Some(tx));
        log_debug("logging-test-on", "key down");
        // Other tests may log concurrently; find our own entry.
        let entry = rx
            .try_iter()
            .find(|entry| entry.category == "logging-test-on")
            .expect("entry routed to sink");
        set_log_sink(None);
        init_logging(false);
        assert_eq!(entry.message, "key down");
        // HH:MM:SS.ffffff
        assert_eq!(entry.time.len(), 15);
        assert_eq!(&entry.time[2..3], ":");
    }
}
