//! Push-to-talk microphone capture via CPAL.
//!
//! One `Recorder` owns the default input device. `start()` opens a stream
//! at the device's native rate; the CPAL callback converts every supported
//! sample format to int16 and forwards ~100 ms blocks into a bounded
//! channel. A dedicated reader thread drains the channel, downmixes stereo
//! to mono, appends to the session buffer, publishes the chunk RMS, and
//! disarms the session when the duration cap is reached. `stop()` joins the
//! reader before the stream is dropped; closing the device while a read is
//! in flight is the classic way to fault the audio backend.

use super::meter::{chunk_rms, LevelMeter};
use super::wav::downmix_stereo_to_mono;
use crate::logging::log_debug;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("already recording")]
    AlreadyRecording,
    #[error("not recording")]
    NotRecording,
    #[error("no audio captured; check microphone permissions and availability")]
    NoAudioCaptured,
    #[error("no default input device available")]
    NoInputDevice,
    #[error("open input stream: {0}")]
    DeviceOpenFailed(String),
    #[error("start input stream: {0}")]
    StreamStartFailed(String),
}

/// Samples captured between press and release, still at the native rate.
#[derive(Debug)]
pub struct Capture {
    pub samples: Vec<i16>,
    pub native_rate: u32,
    pub truncated: bool,
}

struct SessionBuf {
    samples: Vec<i16>,
    truncated: bool,
}

struct SessionShared {
    recording: AtomicBool,
    buf: Mutex<SessionBuf>,
    dropped: AtomicUsize,
}

struct ActiveSession {
    // Dropping the stream tears down the callback; kept until the reader
    // has been joined.
    _stream: cpal::Stream,
    shared: Arc<SessionShared>,
    reader: Option<JoinHandle<()>>,
}

/// Microphone capture engine. Owned by the coordinator; one session at a time.
pub struct Recorder {
    device: cpal::Device,
    native_rate: u32,
    channels: usize,
    sample_format: SampleFormat,
    max_duration_sec: u64,
    meter: LevelMeter,
    session: Option<ActiveSession>,
}

impl Recorder {
    /// Query the default input device and remember its native format.
    /// Channel count is clamped to [1, 2]; anything wider is downmixed.
    pub fn new(max_duration_sec: u64) -> Result<Self, RecorderError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(RecorderError::NoInputDevice)?;
        let default_config = device
            .default_input_config()
            .map_err(|e| RecorderError::DeviceOpenFailed(e.to_string()))?;
        let native_rate = default_config.sample_rate().0;
        let channels = usize::from(default_config.channels()).clamp(1, 2);
        let sample_format = default_config.sample_format();
        log_debug(
            "device",
            &format!(
                "input device {:?}: rate={native_rate}Hz channels={channels} format={sample_format:?}",
                device.name().unwrap_or_else(|_| "unknown".into())
            ),
        );
        Ok(Self {
            device,
            native_rate,
            channels,
            sample_format,
            max_duration_sec,
            meter: LevelMeter::new(),
            session: None,
        })
    }

    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_default()
    }

    /// RMS amplitude of the most recent chunk, in [0, 1].
    pub fn audio_level(&self) -> f64 {
        self.meter.level()
    }

    pub fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.shared.recording.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Open the stream and start accumulating. Fails with `AlreadyRecording`
    /// while a session is armed.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.is_recording() {
            return Err(RecorderError::AlreadyRecording);
        }
        self.session = None;
        self.meter.reset();

        let config = StreamConfig {
            channels: self.channels as u16,
            sample_rate: cpal::SampleRate(self.native_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        // ~100 ms of interleaved samples per block handed to the reader.
        let chunk_len = (self.native_rate as usize / 10).max(1) * self.channels;
        let (tx, rx) = bounded::<Vec<i16>>(32);

        let shared = Arc::new(SessionShared {
            recording: AtomicBool::new(true),
            buf: Mutex::new(SessionBuf {
                samples: Vec::new(),
                truncated: false,
            }),
            dropped: AtomicUsize::new(0),
        });

        let stream = self.build_stream(&config, chunk_len, tx, shared.clone())?;
        stream
            .play()
            .map_err(|e| RecorderError::StreamStartFailed(e.to_string()))?;

        let reader = spawn_reader(
            rx,
            shared.clone(),
            self.meter.clone(),
            self.channels,
            self.native_rate as usize * self.max_duration_sec as usize,
        );

        self.session = Some(ActiveSession {
            _stream: stream,
            shared,
            reader: Some(reader),
        });
        Ok(())
    }

    /// Disarm the session, join the reader, close the device, and hand back
    /// the mono samples. Returns only after the reader thread has exited.
    pub fn stop(&mut self) -> Result<Capture, RecorderError> {
        let mut session = self.session.take().ok_or(RecorderError::NotRecording)?;
        session.shared.recording.store(false, Ordering::Relaxed);
        if let Some(reader) = session.reader.take() {
            let _ = reader.join();
        }
        let dropped = session.shared.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            log_debug("recorder", &format!("dropped {dropped} audio blocks"));
        }
        self.meter.reset();

        let (samples, truncated) = {
            let mut buf = session
                .shared
                .buf
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (std::mem::take(&mut buf.samples), buf.truncated)
        };
        // The stream drops here, after the reader is gone.
        drop(session);

        if samples.is_empty() {
            return Err(RecorderError::NoAudioCaptured);
        }
        Ok(Capture {
            samples,
            native_rate: self.native_rate,
            truncated,
        })
    }

    fn build_stream(
        &self,
        config: &StreamConfig,
        chunk_len: usize,
        tx: Sender<Vec<i16>>,
        shared: Arc<SessionShared>,
    ) -> Result<cpal::Stream, RecorderError> {
        let err_fn = |err| log_debug("audio", &format!("input stream error: {err}"));
        let stream = match self.sample_format {
            SampleFormat::F32 => {
                let mut pump = ChunkPump::new(chunk_len, tx, shared);
                self.device.build_input_stream(
                    config,
                    move |data: &[f32], _| {
                        pump.push(data, |s| {
                            (f64::from(s) * 32_768.0).clamp(-32_768.0, 32_767.0) as i16
                        });
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let mut pump = ChunkPump::new(chunk_len, tx, shared);
                self.device.build_input_stream(
                    config,
                    move |data: &[i16], _| {
                        pump.push(data, |s| s);
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let mut pump = ChunkPump::new(chunk_len, tx, shared);
                self.device.build_input_stream(
                    config,
                    move |data: &[u16], _| {
                        pump.push(data, |s| (i32::from(s) - 32_768) as i16);
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(RecorderError::DeviceOpenFailed(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        };
        stream.map_err(|e| RecorderError::DeviceOpenFailed(e.to_string()))
    }
}

/// Accumulates converted samples inside the CPAL callback and ships fixed
/// ~100 ms blocks to the reader. Lives entirely on the callback thread.
struct ChunkPump {
    pending: Vec<i16>,
    chunk_len: usize,
    tx: Sender<Vec<i16>>,
    shared: Arc<SessionShared>,
}

impl ChunkPump {
    fn new(chunk_len: usize, tx: Sender<Vec<i16>>, shared: Arc<SessionShared>) -> Self {
        Self {
            pending: Vec::with_capacity(chunk_len * 2),
            chunk_len,
            tx,
            shared,
        }
    }

    fn push<T: Copy>(&mut self, data: &[T], convert: impl Fn(T) -> i16) {
        if !self.shared.recording.load(Ordering::Relaxed) {
            return;
        }
        self.pending.extend(data.iter().map(|&s| convert(s)));
        while self.pending.len() >= self.chunk_len {
            let rest = self.pending.split_off(self.chunk_len);
            let chunk = std::mem::replace(&mut self.pending, rest);
            if self.tx.try_send(chunk).is_err() {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn spawn_reader(
    rx: Receiver<Vec<i16>>,
    shared: Arc<SessionShared>,
    meter: LevelMeter,
    channels: usize,
    max_samples: usize,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let wait = Duration::from_millis(100);
        loop {
            if !shared.recording.load(Ordering::Relaxed) {
                break;
            }
            let chunk = match rx.recv_timeout(wait) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // Stream died under us; leave whatever was captured so
                    // stop() can report NoAudioCaptured or a short take.
                    log_debug("recorder", "capture channel disconnected");
                    break;
                }
            };
            meter.set(chunk_rms(&chunk, channels));
            let mono = if channels == 2 {
                downmix_stereo_to_mono(&chunk)
            } else {
                chunk
            };
            let mut buf = shared
                .buf
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !shared.recording.load(Ordering::Relaxed) {
                break;
            }
            let remaining = max_samples.saturating_sub(buf.samples.len());
            if mono.len() >= remaining {
                buf.samples.extend_from_slice(&mono[..remaining]);
                buf.truncated = true;
                drop(buf);
                shared.recording.store(false, Ordering::Relaxed);
                log_debug("recorder", "duration cap reached; capture truncated");
                break;
            }
            buf.samples.extend_from_slice(&mono);
        }
        meter.reset();
    })
}

/// True when a default input device with at least one input channel exists.
pub fn mic_available() -> bool {
    let host = cpal::default_host();
    host.default_input_device()
        .and_then(|d| d.default_input_config().ok())
        .map(|c| c.channels() >= 1)
        .unwrap_or(false)
}

/// Name of the default input device, or an empty string.
pub fn mic_name() -> String {
    let host = cpal::default_host();
    host.default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Arc<SessionShared> {
        Arc::new(SessionShared {
            recording: AtomicBool::new(true),
            buf: Mutex::new(SessionBuf {
                samples: Vec::new(),
                truncated: false,
            }),
            dropped: AtomicUsize::new(0),
        })
    }

    #[test]
    fn pump_emits_fixed_blocks() {
        let shared = shared();
        let (tx, rx) = bounded(8);
        let mut pump = ChunkPump::new(4, tx, shared);
        pump.push(&[1i16, 2, 3], |s| s);
        assert!(rx.try_recv().is_err(), "partial block must not be sent");
        pump.push(&[4i16, 5, 6, 7, 8, 9], |s| s);
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(rx.try_recv().unwrap(), vec![5, 6, 7, 8]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn pump_counts_drops_when_channel_full() {
        let shared = shared();
        let (tx, _rx) = bounded(1);
        let mut pump = ChunkPump::new(2, tx, shared.clone());
        pump.push(&[1i16, 2, 3, 4, 5, 6], |s| s);
        assert_eq!(shared.dropped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn pump_ignores_input_once_disarmed() {
        let shared = shared();
        shared.recording.store(false, Ordering::Relaxed);
        let (tx, rx) = bounded(8);
        let mut pump = ChunkPump::new(2, tx, shared);
        pump.push(&[1i16, 2, 3, 4], |s| s);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reader_enforces_duration_cap_exactly() {
        let shared = shared();
        let (tx, rx) = bounded::<Vec<i16>>(8);
        let reader = spawn_reader(rx, shared.clone(), LevelMeter::new(), 1, 10);
        for _ in 0..4 {
            tx.send(vec![7i16; 4]).unwrap();
        }
        reader.join().unwrap();
        let buf = shared.buf.lock().unwrap();
        assert_eq!(buf.samples.len(), 10, "cap is a hard invariant");
        assert!(buf.truncated);
        assert!(!shared.recording.load(Ordering::Relaxed));
    }

    #[test]
    fn reader_downmixes_stereo_blocks() {
        let shared = shared();
        let (tx, rx) = bounded::<Vec<i16>>(8);
        let reader = spawn_reader(rx, shared.clone(), LevelMeter::new(), 2, 1_000);
        tx.send(vec![100, 200, -100, -200]).unwrap();
        drop(tx);
        reader.join().unwrap();
        let buf = shared.buf.lock().unwrap();
        assert_eq!(buf.samples, vec![150, -150]);
        assert!(!buf.truncated);
    }

    #[test]
    fn reader_exits_promptly_when_disarmed() {
        let shared = shared();
        let (tx, rx) = bounded::<Vec<i16>>(8);
        let reader = spawn_reader(rx, shared.clone(), LevelMeter::new(), 1, 1_000);
        shared.recording.store(false, Ordering::Relaxed);
        let start = std::time::Instant::now();
        reader.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        drop(tx);
    }

    #[test]
    #[ignore = "requires a working microphone"]
    fn live_start_stop_round_trip() {
        let mut rec = Recorder::new(60).unwrap();
        rec.start().unwrap();
        std::thread::sleep(Duration::from_millis(300));
        let capture = rec.stop().unwrap();
        assert!(!capture.samples.is_empty());
        assert!(!capture.truncated);
    }
}
