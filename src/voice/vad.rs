//! Energy-threshold voice activity detection
//!
//! Advisory only: the result is reported to clients and never gates the
//! conversation pipeline.

use serde::Serialize;

use super::wav::pcm_samples;

/// Default RMS threshold above which audio counts as speech
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// Outcome of analyzing one audio buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VadResult {
    pub is_speech: bool,
    pub confidence: f64,
    pub rms: f64,
}

/// RMS voice activity detector
#[derive(Debug, Clone, Copy)]
pub struct VoiceActivity {
    threshold: f64,
}

impl Default for VoiceActivity {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl VoiceActivity {
    /// Create a detector with the given RMS threshold
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Configured threshold
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Analyze raw little-endian 16-bit PCM bytes
    #[must_use]
    pub fn analyze(&self, pcm: &[u8]) -> VadResult {
        self.analyze_samples(&pcm_samples(pcm))
    }

    /// Analyze decoded 16-bit samples
    #[must_use]
    pub fn analyze_samples(&self, samples: &[i16]) -> VadResult {
        let rms = calculate_rms(samples);
        let is_speech = rms > self.threshold;
        let confidence = if is_speech {
            (rms / self.threshold).min(1.0)
        } else {
            0.0
        };

        VadResult {
            is_speech,
            confidence,
            rms,
        }
    }
}

/// RMS of samples normalized to [-1, 1]
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = f64::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt()
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn constant(value: i16, count: usize) -> Vec<u8> {
        std::iter::repeat_n(value, count)
            .flat_map(i16::to_le_bytes)
            .collect()
    }

    #[test]
    fn silence_is_not_speech() {
        let result = VoiceActivity::default().analyze(&constant(0, 1600));
        assert_eq!(result.rms, 0.0);
        assert!(!result.is_speech);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn empty_buffer_is_silence() {
        let result = VoiceActivity::default().analyze(&[]);
        assert_eq!(result.rms, 0.0);
        assert!(!result.is_speech);
    }

    #[test]
    fn threshold_comparison_is_strict() {
        // 328 / 32768 is exactly representable, so the RMS equals the threshold
        let threshold = 328.0 / 32768.0;
        let vad = VoiceActivity::new(threshold);

        let at = vad.analyze(&constant(328, 1024));
        assert_eq!(at.rms, threshold);
        assert!(!at.is_speech);
        assert_eq!(at.confidence, 0.0);

        let above = vad.analyze(&constant(329, 1024));
        assert!(above.is_speech);
        assert!(above.confidence > 0.0);
    }

    #[test]
    fn confidence_is_capped() {
        let result = VoiceActivity::default().analyze(&constant(16_000, 800));
        assert!(result.is_speech);
        assert_eq!(result.confidence, 1.0);
        assert!(result.rms > 0.48 && result.rms < 0.49);
    }

    #[test]
    fn negative_samples_count_as_energy() {
        let result = VoiceActivity::default().analyze(&constant(-8000, 100));
        assert!(result.is_speech);
    }
}
