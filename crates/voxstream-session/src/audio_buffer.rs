//! Bounded ring buffer of raw PCM16 audio.
//!
//! Chunks are stored as received (no copying into a flat array) and trimmed
//! from the oldest end once the retained duration exceeds the limit. The
//! oldest chunk is split when only part of it falls outside the window.

use std::collections::VecDeque;

use voxstream_core::VoxError;

/// Bytes per mono 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Ring buffer holding the most recent `max_seconds` of mono PCM16 LE audio.
#[derive(Debug)]
pub struct AudioRingBuffer {
    sample_rate: u32,
    max_samples: usize,
    chunks: VecDeque<Vec<u8>>,
    total_samples: usize,
}

impl AudioRingBuffer {
    /// Create an empty buffer retaining at most `max_seconds` of audio.
    #[must_use]
    pub fn new(sample_rate: u32, max_seconds: f64) -> Self {
        Self {
            sample_rate,
            max_samples: seconds_to_samples(sample_rate, max_seconds),
            chunks: VecDeque::new(),
            total_samples: 0,
        }
    }

    /// Append a chunk of PCM16 LE bytes, discarding the oldest audio beyond
    /// the retention window.
    ///
    /// Empty chunks are ignored. Chunks that are not a whole number of
    /// samples are rejected and leave the buffer untouched.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), VoxError> {
        if chunk.is_empty() {
            return Ok(());
        }
        if chunk.len() % BYTES_PER_SAMPLE != 0 {
            return Err(VoxError::PartialSample { len: chunk.len() });
        }

        self.total_samples += chunk.len() / BYTES_PER_SAMPLE;
        self.chunks.push_back(chunk.to_vec());
        self.trim();
        Ok(())
    }

    /// Return the most recent `seconds` of audio as one contiguous buffer.
    ///
    /// Returns fewer bytes when less audio is retained, and nothing for a
    /// non-positive duration.
    #[must_use]
    pub fn get_window(&self, seconds: f64) -> Vec<u8> {
        let wanted = seconds_to_samples(self.sample_rate, seconds);
        let samples_needed = wanted.min(self.total_samples);
        if samples_needed == 0 {
            return Vec::new();
        }

        let bytes_needed = samples_needed * BYTES_PER_SAMPLE;
        let mut parts: Vec<&[u8]> = Vec::new();
        let mut collected = 0;

        for chunk in self.chunks.iter().rev() {
            let remaining = bytes_needed - collected;
            if chunk.len() <= remaining {
                parts.push(chunk);
                collected += chunk.len();
            } else {
                parts.push(&chunk[chunk.len() - remaining..]);
                collected = bytes_needed;
            }
            if collected == bytes_needed {
                break;
            }
        }

        let mut window = Vec::with_capacity(bytes_needed);
        for part in parts.iter().rev() {
            window.extend_from_slice(part);
        }
        window
    }

    /// Discard all retained audio.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_samples = 0;
    }

    /// Number of samples currently retained.
    #[must_use]
    pub const fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Maximum number of samples the buffer retains.
    #[must_use]
    pub const fn max_samples(&self) -> usize {
        self.max_samples
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn trim(&mut self) {
        while self.total_samples > self.max_samples {
            let Some(oldest) = self.chunks.front_mut() else {
                break;
            };
            let chunk_samples = oldest.len() / BYTES_PER_SAMPLE;

            if self.total_samples - chunk_samples < self.max_samples {
                // Only part of the oldest chunk falls outside the window.
                let excess = self.total_samples - self.max_samples;
                oldest.drain(..excess * BYTES_PER_SAMPLE);
                self.total_samples -= excess;
                break;
            }

            self.chunks.pop_front();
            self.total_samples -= chunk_samples;
        }
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn seconds_to_samples(sample_rate: u32, seconds: f64) -> usize {
    if !(seconds.is_finite() && seconds > 0.0) {
        return 0;
    }
    (f64::from(sample_rate) * seconds) as usize
}
