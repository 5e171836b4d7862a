//! Application state machine.
//!
//! Single writer: every transition happens on the UI thread. Hotkey events
//! arrive as messages through the inbox; each pipeline stage runs as a
//! one-shot job whose result is polled here. Stage ordering for one
//! session is therefore capture-stop → transcribe → (rewrite?) → inject,
//! with no two stages in flight at once.

use super::{poll_slot, spawn_job, Job, JobPoll};
use crate::audio::{encode_capture, Recorder};
use crate::config::{self, Config};
use crate::hotkey::HotkeyEvent;
use crate::inject::{Inject, PasteMode};
use crate::logging::{log_debug, DebugEntry};
use crate::postprocess::{new_post_processor, PostProcess, ToneRegistry};
use crate::server::Server;
use crate::status::{collect_status, StatusSnapshot};
use crate::transcribe::Transcribe;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors auto-clear to Idle after this long.
const ERROR_CLEAR_AFTER: Duration = Duration::from_secs(5);

/// Background mic/backend probe cadence.
const STATUS_RECHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Transcripts that mean "nothing was said"; they skip injection entirely.
const EMPTY_TRANSCRIPT_SENTINEL: &str = "[BLANK_AUDIO]";

const MAX_DEBUG_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    Idle,
    Recording,
    Transcribing,
    PostProcessing,
    Pasting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStateView {
    None,
    Starting,
    Running,
    Stopped,
    Error,
}

struct PostOutcome {
    result: Result<String, String>,
    original: String,
    needs_space: bool,
}

/// Central coordinator. Owns the recorder and all pipeline jobs.
pub struct App {
    config: Config,
    config_path: PathBuf,
    state: UiState,
    last_transcript: String,
    last_error: String,
    error_deadline: Option<Instant>,
    last_truncated: bool,

    recorder: Option<Recorder>,
    transcriber: Arc<dyn Transcribe>,
    post: Arc<dyn PostProcess>,
    tones: ToneRegistry,
    injector: Arc<dyn Inject>,

    server: Option<Arc<Server>>,
    server_state: ServerStateView,
    server_cancel: Arc<AtomicBool>,

    status: StatusSnapshot,
    last_status_check: Option<Instant>,
    pp_models: Vec<String>,

    hotkey_label: String,
    debug_mode: bool,
    debug_entries: VecDeque<DebugEntry>,

    transcribe_job: Option<Job<Result<String, String>>>,
    post_job: Option<Job<PostOutcome>>,
    paste_job: Option<Job<Result<(), String>>>,
    status_job: Option<Job<StatusSnapshot>>,
    models_job: Option<Job<Result<Vec<String>, String>>>,
    server_job: Option<Job<Result<(), String>>>,

    needs_redraw: bool,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        config_path: PathBuf,
        transcriber: Arc<dyn Transcribe>,
        tones: ToneRegistry,
        injector: Arc<dyn Inject>,
        recorder: Option<Recorder>,
        server: Option<Arc<Server>>,
        hotkey_label: String,
        debug_mode: bool,
    ) -> Self {
        let post = new_post_processor(&config.post_processing, &tones);
        Self {
            config,
            config_path,
            state: UiState::Idle,
            last_transcript: String::new(),
            last_error: String::new(),
            error_deadline: None,
            last_truncated: false,
            recorder,
            transcriber,
            post,
            tones,
            injector,
            server,
            server_state: ServerStateView::None,
            server_cancel: Arc::new(AtomicBool::new(false)),
            status: StatusSnapshot::default(),
            last_status_check: None,
            pp_models: Vec::new(),
            hotkey_label,
            debug_mode,
            debug_entries: VecDeque::new(),
            transcribe_job: None,
            post_job: None,
            paste_job: None,
            status_job: None,
            models_job: None,
            server_job: None,
            needs_redraw: true,
        }
    }

    // ---- accessors used by the renderer -------------------------------

    pub fn state(&self) -> UiState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn last_transcript(&self) -> &str {
        &self.last_transcript
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn last_truncated(&self) -> bool {
        self.last_truncated
    }

    pub fn audio_level(&self) -> f64 {
        match self.state {
            UiState::Recording => self
                .recorder
                .as_ref()
                .map(|r| r.audio_level())
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn status(&self) -> &StatusSnapshot {
        &self.status
    }

    pub fn server_state(&self) -> ServerStateView {
        self.server_state
    }

    pub fn has_server(&self) -> bool {
        self.server.is_some()
    }

    pub fn tone_name(&self) -> &str {
        &self.config.post_processing.tone
    }

    pub fn pp_model_name(&self) -> &str {
        &self.config.post_processing.model
    }

    pub fn hotkey_label(&self) -> &str {
        &self.hotkey_label
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn debug_entries(&self) -> impl Iterator<Item = &DebugEntry> {
        self.debug_entries.iter()
    }

    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }

    // ---- hotkey handling ----------------------------------------------

    pub fn handle_hotkey(&mut self, event: HotkeyEvent) {
        match event {
            HotkeyEvent::Pressed => self.on_hotkey_down(),
            HotkeyEvent::Released => self.on_hotkey_up(),
        }
    }

    fn on_hotkey_down(&mut self) {
        if self.state != UiState::Idle {
            log_debug("hotkey", "press ignored: pipeline busy");
            return;
        }
        log_debug("hotkey", &format!("down: {}", self.hotkey_label));
        let Some(recorder) = self.recorder.as_mut() else {
            self.enter_error("no audio input device detected".to_string());
            return;
        };
        match recorder.start() {
            Ok(()) => {
                self.state = UiState::Recording;
                self.last_error.clear();
                self.last_truncated = false;
                self.request_redraw();
            }
            Err(err) => {
                log_debug("recorder", &format!("start error: {err}"));
                self.enter_error(format!("recording: {err}"));
            }
        }
    }

    fn on_hotkey_up(&mut self) {
        if self.state != UiState::Recording {
            log_debug("hotkey", "release ignored: not recording");
            return;
        }
        log_debug("hotkey", &format!("up: {}", self.hotkey_label));
        self.finish_recording();
    }

    /// Stop capture and launch transcription. Shared by the release path
    /// and the duration-cap path.
    fn finish_recording(&mut self) {
        let Some(recorder) = self.recorder.as_mut() else {
            self.state = UiState::Idle;
            return;
        };
        match recorder.stop() {
            Ok(capture) => {
                log_debug(
                    "recorder",
                    &format!(
                        "stopped: samples={} truncated={}",
                        capture.samples.len(),
                        capture.truncated
                    ),
                );
                self.last_truncated = capture.truncated;
                self.state = UiState::Transcribing;
                self.request_redraw();
                let transcriber = self.transcriber.clone();
                let target_rate = self.config.audio.target_sample_rate;
                self.transcribe_job = Some(spawn_job(move || {
                    let wav = encode_capture(&capture.samples, capture.native_rate, target_rate);
                    log_debug("transcribe", &format!("wav ready: {} bytes", wav.len()));
                    transcriber.transcribe(&wav).map_err(|e| e.to_string())
                }));
            }
            Err(err) => {
                log_debug("recorder", &format!("stop error: {err}"));
                self.enter_error(format!("recording: {err}"));
            }
        }
    }

    // ---- periodic polling ---------------------------------------------

    /// Drain finished jobs and timers. Called on every UI loop iteration.
    pub fn poll(&mut self) {
        self.clear_expired_error();
        self.detect_truncated_capture();
        self.poll_transcription();
        self.poll_post_processing();
        self.poll_paste();
        self.poll_status();
        self.poll_models();
        self.poll_server();
    }

    fn clear_expired_error(&mut self) {
        if self.state == UiState::Error {
            if let Some(deadline) = self.error_deadline {
                if Instant::now() >= deadline {
                    self.state = UiState::Idle;
                    self.last_error.clear();
                    self.error_deadline = None;
                    self.request_redraw();
                }
            }
        }
    }

    /// The capture reader disarms itself at the duration cap; treat that
    /// exactly like a release.
    fn detect_truncated_capture(&mut self) {
        if self.state == UiState::Recording {
            let stopped = self
                .recorder
                .as_ref()
                .map(|r| !r.is_recording())
                .unwrap_or(true);
            if stopped {
                log_debug("recorder", "capture ended at duration cap");
                self.finish_recording();
            }
        }
    }

    fn poll_transcription(&mut self) {
        match poll_slot(&mut self.transcribe_job) {
            Some(JobPoll::Done(Ok(text))) => self.on_transcription_result(text),
            Some(JobPoll::Done(Err(err))) => {
                log_debug("transcribe", &format!("error: {err}"));
                self.enter_error(err);
            }
            Some(JobPoll::Died) => self.enter_error("transcription worker died".to_string()),
            Some(JobPoll::Pending) | None => {}
        }
    }

    /// Transcription finished; decide between rewrite, paste, and skip.
    fn on_transcription_result(&mut self, text: String) {
        log_debug("transcribe", &format!("result: {text:?}"));
        if text.is_empty() || text == EMPTY_TRANSCRIPT_SENTINEL {
            log_debug("transcribe", "empty transcription, skipping paste");
            self.state = UiState::Idle;
            self.request_redraw();
            return;
        }
        // A space joins consecutive dictations within one run.
        let needs_space = !self.last_transcript.is_empty();
        self.last_transcript = text.clone();

        if self.post_processing_active() {
            self.state = UiState::PostProcessing;
            self.request_redraw();
            let post = self.post.clone();
            self.post_job = Some(spawn_job(move || {
                let result = post.rewrite(&text).map_err(|e| e.to_string());
                PostOutcome {
                    result,
                    original: text,
                    needs_space,
                }
            }));
        } else {
            self.start_paste(text, needs_space);
        }
    }

    fn poll_post_processing(&mut self) {
        match poll_slot(&mut self.post_job) {
            Some(JobPoll::Done(outcome)) => match outcome.result {
                Ok(rewritten) => {
                    log_debug("transcribe", &format!("post-processing result: {rewritten:?}"));
                    self.start_paste(rewritten, outcome.needs_space);
                }
                Err(err) => {
                    // Graceful degradation: the transcript still gets
                    // delivered, the rewrite just didn't happen.
                    log_debug(
                        "transcribe",
                        &format!("post-processing error (falling back to original): {err}"),
                    );
                    self.start_paste(outcome.original, outcome.needs_space);
                }
            },
            Some(JobPoll::Died) => {
                log_debug("transcribe", "post-processing worker died");
                self.state = UiState::Idle;
                self.request_redraw();
            }
            Some(JobPoll::Pending) | None => {}
        }
    }

    fn start_paste(&mut self, text: String, needs_space: bool) {
        let text = if needs_space { format!(" {text}") } else { text };
        self.state = UiState::Pasting;
        self.request_redraw();
        let injector = self.injector.clone();
        let delay_ms = self.config.paste.delay_ms;
        let mode = PasteMode::from_config(&self.config.paste.mode);
        log_debug(
            "paste",
            &format!("mode={} delay={delay_ms}ms", self.config.paste.mode),
        );
        self.paste_job = Some(spawn_job(move || {
            injector
                .inject(&text, delay_ms, mode)
                .map_err(|e| e.to_string())
        }));
    }

    fn poll_paste(&mut self) {
        match poll_slot(&mut self.paste_job) {
            Some(JobPoll::Done(Ok(()))) => {
                log_debug("paste", "success");
                self.state = UiState::Idle;
                self.request_redraw();
            }
            Some(JobPoll::Done(Err(err))) => {
                log_debug("paste", &format!("error: {err}"));
                self.enter_error(format!("paste: {err}"));
            }
            Some(JobPoll::Died) => self.enter_error("paste worker died".to_string()),
            Some(JobPoll::Pending) | None => {}
        }
    }

    fn post_processing_active(&self) -> bool {
        self.config.post_processing.enabled
            && self.config.post_processing.tone.to_lowercase() != "off"
    }

    fn enter_error(&mut self, message: String) {
        self.state = UiState::Error;
        self.last_error = message;
        self.error_deadline = Some(Instant::now() + ERROR_CLEAR_AFTER);
        self.request_redraw();
    }

    // ---- status projection --------------------------------------------

    /// Kick off a probe when none has run recently. The UI loop calls this
    /// every iteration; the 30-second cadence lives here.
    pub fn maybe_refresh_status(&mut self) {
        let due = self
            .last_status_check
            .map(|at| at.elapsed() >= STATUS_RECHECK_INTERVAL)
            .unwrap_or(true);
        if due && self.status_job.is_none() {
            self.refresh_status();
        }
    }

    pub fn refresh_status(&mut self) {
        self.last_status_check = Some(Instant::now());
        let transcriber = self.transcriber.clone();
        self.status_job = Some(spawn_job(move || collect_status(&transcriber)));
    }

    fn poll_status(&mut self) {
        if let Some(JobPoll::Done(snapshot)) = poll_slot(&mut self.status_job) {
            if snapshot != self.status {
                self.status = snapshot;
                self.request_redraw();
            }
        }
    }

    // ---- interactive toggles ------------------------------------------

    /// `t` in the panel: persist the theme chosen by the UI layer.
    pub fn set_theme(&mut self, name: &str) {
        self.config.theme = name.to_lowercase();
        self.save_config();
        self.request_redraw();
    }

    /// `p` in the panel: advance the tone cycle and rebuild the rewriter.
    pub fn cycle_tone(&mut self) {
        let next = self
            .tones
            .next_tone(&self.config.post_processing.tone)
            .to_string();
        log_debug("config", &format!("tone -> {next}"));
        self.config.post_processing.tone = next.clone();
        self.config.post_processing.enabled = next != "off";
        self.rebuild_post_processor();
        self.save_config();
        self.refresh_pp_models();
        self.request_redraw();
    }

    /// `m` in the panel: advance through the models the backend reported.
    pub fn cycle_pp_model(&mut self) {
        if !self.post_processing_active() || self.pp_models.is_empty() {
            return;
        }
        let current = self
            .pp_models
            .iter()
            .position(|m| *m == self.config.post_processing.model);
        let next_index = current.map(|i| (i + 1) % self.pp_models.len()).unwrap_or(0);
        self.config.post_processing.model = self.pp_models[next_index].clone();
        log_debug(
            "config",
            &format!("post-processing model -> {}", self.config.post_processing.model),
        );
        self.rebuild_post_processor();
        self.save_config();
        self.refresh_pp_models();
        self.request_redraw();
    }

    /// `r` in the panel: restart the managed server.
    pub fn restart_server(&mut self) {
        let Some(server) = self.server.clone() else {
            return;
        };
        if self.server_job.is_some() {
            return;
        }
        self.server_state = ServerStateView::Starting;
        self.request_redraw();
        let cancel = self.server_cancel.clone();
        self.server_job = Some(spawn_job(move || {
            server.restart(&cancel).map_err(|e| e.to_string())
        }));
    }

    /// Auto-start at launch when configured and installed.
    pub fn start_server(&mut self) {
        let Some(server) = self.server.clone() else {
            return;
        };
        if self.server_job.is_some() {
            return;
        }
        self.server_state = ServerStateView::Starting;
        let cancel = self.server_cancel.clone();
        self.server_job = Some(spawn_job(move || {
            server.start(&cancel).map_err(|e| e.to_string())
        }));
    }

    fn poll_server(&mut self) {
        match poll_slot(&mut self.server_job) {
            Some(JobPoll::Done(Ok(()))) => {
                self.server_state = ServerStateView::Running;
                self.request_redraw();
                self.refresh_status();
            }
            Some(JobPoll::Done(Err(err))) => {
                log_debug("server", &format!("start failed: {err}"));
                self.server_state = ServerStateView::Error;
                self.request_redraw();
            }
            Some(JobPoll::Died) => {
                self.server_state = ServerStateView::Error;
                self.request_redraw();
            }
            Some(JobPoll::Pending) | None => {}
        }
    }

    fn rebuild_post_processor(&mut self) {
        self.post = new_post_processor(&self.config.post_processing, &self.tones);
    }

    /// Ask the rewriter's backend which models it serves.
    pub fn refresh_pp_models(&mut self) {
        if !self.post_processing_active() {
            return;
        }
        let post = self.post.clone();
        self.models_job = Some(spawn_job(move || match post.models() {
            Some(lister) => lister.list_models().map_err(|e| e.to_string()),
            None => Ok(Vec::new()),
        }));
    }

    fn poll_models(&mut self) {
        match poll_slot(&mut self.models_job) {
            Some(JobPoll::Done(Ok(models))) => self.on_pp_models(models),
            Some(JobPoll::Done(Err(err))) => {
                log_debug("transcribe", &format!("failed to list post-processing models: {err}"));
            }
            _ => {}
        }
    }

    /// Adopt the first listed model when the configured one is absent, and
    /// persist the switch so restarts agree with the running state.
    fn on_pp_models(&mut self, models: Vec<String>) {
        if models.is_empty() {
            self.pp_models = models;
            return;
        }
        let configured = self.config.post_processing.model.clone();
        if !models.contains(&configured) {
            log_debug(
                "config",
                &format!(
                    "configured post-processing model {configured:?} not found, using {:?}",
                    models[0]
                ),
            );
            self.config.post_processing.model = models[0].clone();
            if self.post_processing_active() {
                self.rebuild_post_processor();
            }
            self.save_config();
        }
        self.pp_models = models;
        self.request_redraw();
    }

    // ---- misc ----------------------------------------------------------

    pub fn push_debug(&mut self, entry: DebugEntry) {
        self.debug_entries.push_back(entry);
        while self.debug_entries.len() > MAX_DEBUG_ENTRIES {
            self.debug_entries.pop_front();
        }
        self.request_redraw();
    }

    fn save_config(&self) {
        if let Err(err) = config::save(&self.config_path, &self.config) {
            log_debug("config", &format!("failed to save config: {err:#}"));
        }
    }

    /// Shutdown ordering: cancel server waits, stop capture (joining the
    /// reader), then stop the managed server (≤5 s grace).
    pub fn shutdown(&mut self) {
        self.server_cancel.store(true, Ordering::Relaxed);
        if let Some(recorder) = self.recorder.as_mut() {
            if recorder.is_recording() {
                let _ = recorder.stop();
            }
        }
        if let Some(server) = self.server.take() {
            if let Err(err) = server.stop() {
                log_debug("server", &format!("stop error at shutdown: {err}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::InjectError;
    use crate::transcribe::TranscribeError;
    use std::sync::Mutex;

    struct FakeTranscriber;

    impl Transcribe for FakeTranscriber {
        fn transcribe(&self, _wav: &[u8]) -> Result<String, TranscribeError> {
            Ok("unused".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingInjector {
        calls: Mutex<Vec<String>>,
    }

    impl Inject for RecordingInjector {
        fn inject(&self, text: &str, _delay_ms: u64, _mode: PasteMode) -> Result<(), InjectError> {
            self.calls
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(text.to_string());
            Ok(())
        }
    }

    struct FailingInjector;

    impl Inject for FailingInjector {
        fn inject(&self, _t: &str, _d: u64, _m: PasteMode) -> Result<(), InjectError> {
            Err(InjectError::BackendInvocationFailed("nope".to_string()))
        }
    }

    struct FailingPost;

    impl PostProcess for FailingPost {
        fn rewrite(&self, _text: &str) -> Result<String, crate::postprocess::PostProcessError> {
            Err(crate::postprocess::PostProcessError::NoChoices)
        }
    }

    struct UppercasePost;

    impl PostProcess for UppercasePost {
        fn rewrite(&self, text: &str) -> Result<String, crate::postprocess::PostProcessError> {
            Ok(text.to_uppercase())
        }
    }

    fn test_app(injector: Arc<dyn Inject>) -> App {
        let dir = std::env::temp_dir().join("palaver-app-tests");
        let mut config = Config::default();
        config.paste.delay_ms = 0;
        App::new(
            config,
            dir.join("config.toml"),
            Arc::new(FakeTranscriber),
            ToneRegistry::builtin(),
            injector,
            None,
            None,
            "KEY_F12".to_string(),
            false,
        )
    }

    fn drain_until_idle(app: &mut App) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            app.poll();
            if app.state() == UiState::Idle || app.state() == UiState::Error {
                return;
            }
            assert!(Instant::now() < deadline, "pipeline never settled");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn empty_transcript_skips_injection() {
        let injector = Arc::new(RecordingInjector::default());
        let mut app = test_app(injector.clone());
        app.state = UiState::Transcribing;
        app.on_transcription_result(String::new());
        assert_eq!(app.state(), UiState::Idle);
        assert!(injector.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn blank_audio_sentinel_skips_injection() {
        let injector = Arc::new(RecordingInjector::default());
        let mut app = test_app(injector.clone());
        app.state = UiState::Transcribing;
        app.on_transcription_result("[BLANK_AUDIO]".to_string());
        assert_eq!(app.state(), UiState::Idle);
        assert!(injector.calls.lock().unwrap().is_empty());
        assert!(app.last_transcript().is_empty());
    }

    #[test]
    fn transcript_flows_to_injection_and_back_to_idle() {
        let injector = Arc::new(RecordingInjector::default());
        let mut app = test_app(injector.clone());
        app.state = UiState::Transcribing;
        app.on_transcription_result("hello world".to_string());
        assert_eq!(app.state(), UiState::Pasting);
        drain_until_idle(&mut app);
        assert_eq!(app.state(), UiState::Idle);
        assert_eq!(*injector.calls.lock().unwrap(), vec!["hello world"]);
    }

    #[test]
    fn second_transcript_gets_a_leading_space() {
        let injector = Arc::new(RecordingInjector::default());
        let mut app = test_app(injector.clone());
        app.state = UiState::Transcribing;
        app.on_transcription_result("first".to_string());
        drain_until_idle(&mut app);
        app.state = UiState::Transcribing;
        app.on_transcription_result("second".to_string());
        drain_until_idle(&mut app);
        assert_eq!(*injector.calls.lock().unwrap(), vec!["first", " second"]);
    }

    #[test]
    fn post_processing_failure_falls_back_to_original() {
        let injector = Arc::new(RecordingInjector::default());
        let mut app = test_app(injector.clone());
        app.config.post_processing.enabled = true;
        app.config.post_processing.tone = "formal".to_string();
        app.post = Arc::new(FailingPost);

        app.state = UiState::Transcribing;
        app.on_transcription_result("original text".to_string());
        assert_eq!(app.state(), UiState::PostProcessing);
        drain_until_idle(&mut app);
        assert_eq!(app.state(), UiState::Idle, "fallback must not surface an error");
        assert_eq!(*injector.calls.lock().unwrap(), vec!["original text"]);
    }

    #[test]
    fn post_processing_failure_keeps_the_joining_space() {
        let injector = Arc::new(RecordingInjector::default());
        let mut app = test_app(injector.clone());
        app.config.post_processing.enabled = true;
        app.config.post_processing.tone = "formal".to_string();
        app.post = Arc::new(FailingPost);

        // First dictation of the run: no space, original pasted.
        app.state = UiState::Transcribing;
        app.on_transcription_result("first".to_string());
        drain_until_idle(&mut app);

        // Second dictation still joins with a space when the rewrite fails.
        app.state = UiState::Transcribing;
        app.on_transcription_result("second".to_string());
        drain_until_idle(&mut app);
        assert_eq!(*injector.calls.lock().unwrap(), vec!["first", " second"]);
    }

    #[test]
    fn post_processing_success_pastes_the_rewrite() {
        let injector = Arc::new(RecordingInjector::default());
        let mut app = test_app(injector.clone());
        app.config.post_processing.enabled = true;
        app.config.post_processing.tone = "formal".to_string();
        app.post = Arc::new(UppercasePost);

        app.state = UiState::Transcribing;
        app.on_transcription_result("quiet words".to_string());
        drain_until_idle(&mut app);
        assert_eq!(*injector.calls.lock().unwrap(), vec!["QUIET WORDS"]);
    }

    #[test]
    fn paste_failure_enters_error_then_auto_clears() {
        let mut app = test_app(Arc::new(FailingInjector));
        app.state = UiState::Transcribing;
        app.on_transcription_result("doomed".to_string());
        drain_until_idle(&mut app);
        assert_eq!(app.state(), UiState::Error);
        assert!(app.last_error().contains("paste"));

        // Force the deadline into the past instead of sleeping five seconds.
        app.error_deadline = Some(Instant::now() - Duration::from_millis(1));
        app.poll();
        assert_eq!(app.state(), UiState::Idle);
        assert!(app.last_error().is_empty());
    }

    #[test]
    fn press_outside_idle_is_ignored() {
        let mut app = test_app(Arc::new(RecordingInjector::default()));
        app.state = UiState::Transcribing;
        app.handle_hotkey(HotkeyEvent::Pressed);
        assert_eq!(app.state(), UiState::Transcribing);
    }

    #[test]
    fn release_outside_recording_is_ignored() {
        let mut app = test_app(Arc::new(RecordingInjector::default()));
        app.handle_hotkey(HotkeyEvent::Released);
        assert_eq!(app.state(), UiState::Idle);
    }

    #[test]
    fn press_without_recorder_surfaces_device_error() {
        let mut app = test_app(Arc::new(RecordingInjector::default()));
        app.handle_hotkey(HotkeyEvent::Pressed);
        assert_eq!(app.state(), UiState::Error);
        assert!(app.last_error().contains("no audio input device"));
    }

    #[test]
    fn tone_cycle_toggles_enablement_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut app = test_app(Arc::new(RecordingInjector::default()));
        app.config_path = path.clone();

        assert_eq!(app.tone_name(), "off");
        app.cycle_tone();
        assert_eq!(app.tone_name(), "formal");
        assert!(app.config.post_processing.enabled);
        let saved = config::load(&path).unwrap();
        assert_eq!(saved.post_processing.tone, "formal");

        app.cycle_tone();
        app.cycle_tone();
        app.cycle_tone();
        assert_eq!(app.tone_name(), "off");
        assert!(!app.config.post_processing.enabled);
    }

    #[test]
    fn missing_configured_model_adopts_first_listed() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(Arc::new(RecordingInjector::default()));
        app.config_path = dir.path().join("config.toml");
        app.config.post_processing.enabled = true;
        app.config.post_processing.tone = "formal".to_string();
        app.config.post_processing.model = "gone".to_string();

        app.on_pp_models(vec!["llama3".to_string(), "qwen".to_string()]);
        assert_eq!(app.pp_model_name(), "llama3");
        let saved = config::load(&app.config_path).unwrap();
        assert_eq!(saved.post_processing.model, "llama3");
    }

    #[test]
    fn present_configured_model_is_kept() {
        let mut app = test_app(Arc::new(RecordingInjector::default()));
        app.config.post_processing.model = "qwen".to_string();
        app.on_pp_models(vec!["llama3".to_string(), "qwen".to_string()]);
        assert_eq!(app.pp_model_name(), "qwen");
    }

    #[test]
    fn debug_entries_are_capped() {
        let mut app = test_app(Arc::new(RecordingInjector::default()));
        for i in 0..120 {
            app.push_debug(DebugEntry {
                time: String::new(),
                category: "debug".to_string(),
                message: format!("line {i}"),
            });
        }
        assert_eq!(app.debug_entries().count(), 50);
        assert_eq!(
            app.debug_entries().next().unwrap().message,
            "line 70",
            "oldest entries drop first"
        );
    }
}
