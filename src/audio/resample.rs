//! Sample-rate conversion for captured speech.
//!
//! Polyphase windowed-sinc conversion over mono 16-bit PCM. Speech-quality
//! parameters: a short sinc kernel is plenty at 16-bit precision, and the
//! output length is pinned to `round(n * to / from)` so callers can reason
//! about durations.

use crate::logging::log_debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::cmp::Ordering as CmpOrdering;

const CHUNK: usize = 256;

/// Convert mono int16 PCM from `from` Hz to `to` Hz.
///
/// Equal rates and empty input are identity; a zero rate would be a config
/// bug and is treated as identity rather than dividing by zero.
pub fn resample(input: &[i16], from: u32, to: u32) -> Vec<i16> {
    if input.is_empty() || from == to || from == 0 || to == 0 {
        return input.to_vec();
    }

    let ratio = f64::from(to) / f64::from(from);
    let expected = (input.len() as f64 * ratio).round().max(1.0) as usize;

    let floats: Vec<f32> = input.iter().map(|&s| f32::from(s) / 32_768.0).collect();
    let out = match sinc_resample(&floats, ratio) {
        Ok(out) => out,
        Err(err) => {
            // A construction failure here means the ratio is far outside
            // anything a sound card produces; pass the audio through rather
            // than losing the capture.
            log_debug("audio", &format!("resampler unavailable ({err}); passing audio through"));
            return input.to_vec();
        }
    };

    let mut samples: Vec<i16> = out
        .iter()
        .map(|&f| (f64::from(f) * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16)
        .collect();

    match samples.len().cmp(&expected) {
        CmpOrdering::Greater => samples.truncate(expected),
        CmpOrdering::Less => {
            let pad = samples.last().copied().unwrap_or(0);
            samples.resize(expected, pad);
        }
        CmpOrdering::Equal => {}
    }
    samples
}

fn sinc_resample(input: &[f32], ratio: f64) -> Result<Vec<f32>, String> {
    let params = SincInterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut rs =
        SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK, 1).map_err(|e| e.to_string())?;

    let mut out = Vec::with_capacity((input.len() as f64 * ratio).ceil() as usize + CHUNK);
    let mut seg = vec![0.0f32; CHUNK];
    let mut idx = 0usize;
    while idx < input.len() {
        let end = (idx + CHUNK).min(input.len());
        let len = end - idx;
        // Pad the final partial chunk with its last sample so the filter
        // tail does not ring against a hard zero edge.
        let pad = input[end - 1];
        seg.fill(pad);
        seg[..len].copy_from_slice(&input[idx..end]);
        let produced = rs
            .process(std::slice::from_ref(&seg), None)
            .map_err(|e| e.to_string())?;
        out.extend_from_slice(&produced[0]);
        idx = end;
    }
    Ok(out)
}
