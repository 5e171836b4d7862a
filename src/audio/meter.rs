use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live audio level shared between the capture reader and the UI.
///
/// Stores the RMS amplitude of the most recent chunk as f64 bits in an
/// atomic, so readers on any thread can sample it without locking.
#[derive(Clone, Debug, Default)]
pub struct LevelMeter {
    bits: Arc<AtomicU64>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, level: f64) {
        self.bits
            .store(level.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Latest RMS amplitude in [0, 1].
    pub fn level(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.bits.store(0f64.to_bits(), Ordering::Relaxed);
    }
}

/// RMS of an interleaved int16 chunk, averaged across channels first,
/// normalized to [0, 1].
pub(super) fn chunk_rms(buf: &[i16], channels: usize) -> f64 {
    if buf.is_empty() || channels == 0 {
        return 0.0;
    }
    let frames = buf.len() / channels;
    if frames == 0 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for frame in buf.chunks_exact(channels) {
        let v = if channels == 2 {
            f64::from(i32::from(frame[0]) + i32::from(frame[1])) / 2.0
        } else {
            f64::from(frame[0])
        };
        let v = v / 32_768.0;
        sum += v * v;
    }
    (sum / frames as f64).sqrt().clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_starts_at_zero() {
        assert_eq!(LevelMeter::new().level(), 0.0);
    }

    #[test]
    fn meter_clamps_to_unit_range() {
        let meter = LevelMeter::new();
        meter.set(3.5);
        assert_eq!(meter.level(), 1.0);
        meter.set(-1.0);
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(chunk_rms(&[0; 160], 1), 0.0);
        assert_eq!(chunk_rms(&[], 1), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_near_one() {
        let buf = vec![i16::MAX; 160];
        let rms = chunk_rms(&buf, 1);
        assert!(rms > 0.99 && rms <= 1.0, "rms = {rms}");
    }

    #[test]
    fn stereo_rms_averages_channels() {
        // L = +8192, R = -8192 cancel out to silence.
        let mut buf = Vec::new();
        for _ in 0..100 {
            buf.push(8_192i16);
            buf.push(-8_192i16);
        }
        assert_eq!(chunk_rms(&buf, 2), 0.0);
    }
}
