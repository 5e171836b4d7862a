//! In-memory RIFF/WAVE encoding, decoding, and header inspection.

use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("not a RIFF file")]
    NotRiff,
    #[error("not a WAVE file")]
    NotWave,
    #[error("truncated WAV header ({0} bytes, need 44)")]
    TruncatedHeader(usize),
    #[error("wav encode failed: {0}")]
    Encode(#[from] hound::Error),
}

/// Fields pulled from a minimal WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Encode mono 16-bit PCM into a complete WAV file in memory.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        // Writing int16 samples into a Vec cannot fail.
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).expect("wav writer over Vec never fails");
        for &s in samples {
            writer.write_sample(s).expect("wav sample write over Vec");
        }
        writer.finalize().expect("wav finalize over Vec");
    }
    cursor.into_inner()
}

/// Decode a WAV file back into samples and its sample rate. Used by tests
/// and diagnostics; the capture path only ever encodes.
pub fn decode_wav(data: &[u8]) -> Result<(Vec<i16>, u32), WavError> {
    let reader = hound::WavReader::new(Cursor::new(data))?;
    let rate = reader.spec().sample_rate;
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok((samples, rate))
}

/// Parse the leading 44 bytes of a purported WAV file.
///
/// Only the canonical PCM layout (fmt chunk directly after the RIFF header)
/// is inspected; that is what this program produces and what the managed
/// backends expect.
pub fn validate_wav_header(data: &[u8]) -> Result<WavInfo, WavError> {
    if data.len() < 44 {
        return Err(WavError::TruncatedHeader(data.len()));
    }
    if &data[0..4] != b"RIFF" {
        return Err(WavError::NotRiff);
    }
    if &data[8..12] != b"WAVE" {
        return Err(WavError::NotWave);
    }
    let channels = u16::from_le_bytes([data[22], data[23]]);
    let sample_rate = u32::from_le_bytes([data[24], data[25], data[26], data[27]]);
    let bits_per_sample = u16::from_le_bytes([data[34], data[35]]);
    Ok(WavInfo {
        sample_rate,
        channels,
        bits_per_sample,
    })
}

/// Average interleaved stereo down to mono: `mono[i] = (l + r) / 2` with the
/// division truncating toward zero in 32-bit arithmetic.
pub fn downmix_stereo_to_mono(stereo: &[i16]) -> Vec<i16> {
    let mut mono = Vec::with_capacity(stereo.len() / 2);
    for pair in stereo.chunks_exact(2) {
        mono.push(((i32::from(pair[0]) + i32::from(pair[1])) / 2) as i16);
    }
    mono
}
