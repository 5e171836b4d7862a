//! Microphone capture and the pure DSP pipeline.
//!
//! Capture happens at the device's native rate via CPAL; samples are
//! normalized to 16-bit mono, resampled to the configured target rate, and
//! encoded as an in-memory RIFF/WAVE file for the transcription dispatcher.

mod meter;
mod recorder;
mod resample;
mod wav;

pub use meter::LevelMeter;
pub use recorder::{mic_available, mic_name, Capture, Recorder, RecorderError};
pub use resample::resample;
pub use wav::{
    decode_wav, downmix_stereo_to_mono, encode_wav, validate_wav_header, WavError, WavInfo,
};

/// Produce the final audio artifact for one capture session: mono PCM at the
/// native rate in, complete WAV bytes at the target rate out.
pub fn encode_capture(samples: &[i16], native_rate: u32, target_rate: u32) -> Vec<u8> {
    let resampled = if native_rate == target_rate {
        samples.to_vec()
    } else {
        resample(samples, native_rate, target_rate)
    };
    encode_wav(&resampled, target_rate)
}
