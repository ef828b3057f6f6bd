//! RMS-energy frame classifier.
//!
//! A dependency-free [`FrameClassifier`] for deployments without a neural
//! VAD model: a frame is speech when its RMS energy exceeds a threshold.

use voxstream_core::FrameClassifier;

/// Energy-threshold speech classifier over PCM16 LE frames.
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    /// RMS level (0.0–1.0 of full scale) above which a frame is speech.
    threshold: f32,
}

impl EnergyClassifier {
    /// Create a classifier with an explicit RMS threshold.
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Create a classifier from a 0.0–1.0 sensitivity setting.
    ///
    /// Higher values require louder input before a frame counts as speech.
    #[must_use]
    pub fn from_sensitivity(vad_threshold: f32) -> Self {
        // Map [0.0, 1.0] → [0.001, 0.05] RMS energy range
        let min_energy: f32 = 0.001;
        let max_energy: f32 = 0.05;
        Self::new((max_energy - min_energy).mul_add(vad_threshold.clamp(0.0, 1.0), min_energy))
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::from_sensitivity(0.5)
    }
}

impl FrameClassifier for EnergyClassifier {
    fn classify_frame(&mut self, frame: &[u8], _sample_rate: u32) -> bool {
        pcm16_rms(frame) > self.threshold
    }
}

/// RMS level of PCM16 LE bytes, normalised to full scale.
#[must_use]
pub fn pcm16_rms(frame: &[u8]) -> f32 {
    let mut sum_squares = 0.0_f64;
    let mut count = 0_u32;
    for pair in frame.chunks_exact(2) {
        let sample = f64::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0;
        sum_squares += sample * sample;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let rms = (sum_squares / f64::from(count)).sqrt() as f32;
    rms
}
