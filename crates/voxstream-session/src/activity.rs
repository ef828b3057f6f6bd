//! Speech activity tracking. Turns a raw PCM byte stream into per-frame
//! speech/silence results and an edge-triggered end-of-utterance signal.
//!
//! Audio arrives in arbitrarily sized chunks. The tracker slices it into
//! fixed 30 ms frames, classifies each frame through a [`FrameClassifier`],
//! and counts consecutive silent frames once speech has been heard. When the
//! count reaches the configured threshold it reports `reached_silence` once
//! and goes back to waiting for speech.

use voxstream_core::FrameClassifier;

use crate::audio_buffer::BYTES_PER_SAMPLE;

/// Duration of one classification frame.
pub const FRAME_MS: u32 = 30;

/// Classification of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameActivity {
    /// The classifier heard speech in this frame.
    pub is_speech: bool,

    /// This frame completed a silence run long enough to end the utterance.
    pub reached_silence: bool,
}

/// Fixed-frame voice activity state machine.
pub struct SpeechActivityTracker {
    sample_rate: u32,
    frame_bytes: usize,
    classifier: Box<dyn FrameClassifier>,
    pending: Vec<u8>,
    speech_active: bool,
    silence_frames: u32,
    silence_limit: u32,
}

impl SpeechActivityTracker {
    /// Create a tracker that ends an utterance after `silence_ms` of silence.
    pub fn new(sample_rate: u32, silence_ms: u32, classifier: Box<dyn FrameClassifier>) -> Self {
        let samples_per_frame = u64::from(sample_rate) * u64::from(FRAME_MS) / 1000;
        let samples_per_frame = usize::try_from(samples_per_frame.max(1)).unwrap_or(usize::MAX);
        Self {
            sample_rate,
            frame_bytes: samples_per_frame.saturating_mul(BYTES_PER_SAMPLE),
            classifier,
            pending: Vec::new(),
            speech_active: false,
            silence_frames: 0,
            silence_limit: (silence_ms / FRAME_MS).max(1),
        }
    }

    /// Feed raw bytes and classify every complete frame now available.
    ///
    /// The returned iterator consumes one frame per item. Bytes that do not
    /// fill a frame stay pending for the next call; so do any frames left
    /// unconsumed if the iterator is dropped early.
    pub fn feed(&mut self, chunk: &[u8]) -> FrameResults<'_> {
        self.pending.extend_from_slice(chunk);
        FrameResults { tracker: self }
    }

    /// Forget pending bytes and any in-progress utterance.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.speech_active = false;
        self.silence_frames = 0;
    }

    /// Size of one classification frame in bytes.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Consecutive silent frames that end an utterance.
    #[must_use]
    pub const fn silence_limit(&self) -> u32 {
        self.silence_limit
    }

    /// Whether speech has been heard since the last silence edge or reset.
    #[must_use]
    pub const fn is_speech_active(&self) -> bool {
        self.speech_active
    }

    /// Bytes waiting for a complete frame.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    fn next_frame(&mut self) -> Option<FrameActivity> {
        if self.frame_bytes == 0 || self.pending.len() < self.frame_bytes {
            return None;
        }

        let frame: Vec<u8> = self.pending.drain(..self.frame_bytes).collect();
        let is_speech = self.classifier.classify_frame(&frame, self.sample_rate);
        let mut reached_silence = false;

        if is_speech {
            self.speech_active = true;
            self.silence_frames = 0;
        } else if self.speech_active {
            self.silence_frames += 1;
            if self.silence_frames >= self.silence_limit {
                reached_silence = true;
                self.speech_active = false;
                self.silence_frames = 0;
                tracing::debug!(
                    frames = self.silence_limit,
                    "Silence threshold reached after speech"
                );
            }
        }

        Some(FrameActivity {
            is_speech,
            reached_silence,
        })
    }
}

impl std::fmt::Debug for SpeechActivityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechActivityTracker")
            .field("sample_rate", &self.sample_rate)
            .field("frame_bytes", &self.frame_bytes)
            .field("pending", &self.pending.len())
            .field("speech_active", &self.speech_active)
            .field("silence_frames", &self.silence_frames)
            .field("silence_limit", &self.silence_limit)
            .finish_non_exhaustive()
    }
}

/// Lazily classified frames from one [`SpeechActivityTracker::feed`] call.
pub struct FrameResults<'a> {
    tracker: &'a mut SpeechActivityTracker,
}

impl Iterator for FrameResults<'_> {
    type Item = FrameActivity;

    fn next(&mut self) -> Option<Self::Item> {
        self.tracker.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Classifier {}
        impl FrameClassifier for Classifier {
            fn classify_frame(&mut self, frame: &[u8], sample_rate: u32) -> bool;
        }
    }

    const RATE: u32 = 16_000;
    const FRAME: usize = 960;

    /// Classifier that treats frames starting with a non-zero byte as speech.
    fn marker_classifier() -> Box<dyn FrameClassifier> {
        let mut mock = MockClassifier::new();
        mock.expect_classify_frame()
            .returning(|frame, _| frame.first().is_some_and(|b| *b != 0));
        Box::new(mock)
    }

    fn speech(frames: usize) -> Vec<u8> {
        vec![1; FRAME * frames]
    }

    fn silence(frames: usize) -> Vec<u8> {
        vec![0; FRAME * frames]
    }

    fn tracker(silence_ms: u32) -> SpeechActivityTracker {
        SpeechActivityTracker::new(RATE, silence_ms, marker_classifier())
    }

    #[test]
    fn frame_size_is_thirty_ms_of_pcm16() {
        let tracker = tracker(350);
        assert_eq!(tracker.frame_bytes(), FRAME);
        assert_eq!(tracker.silence_limit(), 11);
    }

    #[test]
    fn frame_size_holds_for_extreme_sample_rates() {
        let fast = SpeechActivityTracker::new(200_000_000, 350, marker_classifier());
        assert_eq!(fast.frame_bytes(), 6_000_000 * 2);

        let slow = SpeechActivityTracker::new(8, 350, marker_classifier());
        assert_eq!(slow.frame_bytes(), 2);
    }

    #[test]
    fn silence_limit_is_at_least_one_frame() {
        assert_eq!(tracker(0).silence_limit(), 1);
        assert_eq!(tracker(29).silence_limit(), 1);
    }

    #[test]
    fn partial_frames_accumulate_without_results() {
        let mut tracker = tracker(90);
        assert_eq!(tracker.feed(&vec![1; FRAME - 10]).count(), 0);
        assert_eq!(tracker.pending_bytes(), FRAME - 10);

        let results: Vec<_> = tracker.feed(&[1; 20]).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_speech);
        assert_eq!(tracker.pending_bytes(), 10);
    }

    #[test]
    fn passes_sample_rate_to_classifier() {
        let mut mock = MockClassifier::new();
        mock.expect_classify_frame()
            .withf(|frame, rate| frame.len() == FRAME && *rate == RATE)
            .times(2)
            .return_const(false);
        let mut tracker = SpeechActivityTracker::new(RATE, 90, Box::new(mock));
        assert_eq!(tracker.feed(&silence(2)).count(), 2);
    }

    #[test]
    fn reached_silence_fires_once_per_silence_run() {
        let mut tracker = tracker(90); // 3 frames

        let mut audio = speech(2);
        audio.extend(silence(10));
        let results: Vec<_> = tracker.feed(&audio).collect();

        assert_eq!(results.len(), 12);
        let edges: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.reached_silence)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(edges, vec![4]);
        assert!(!tracker.is_speech_active());
    }

    #[test]
    fn never_fires_without_prior_speech() {
        let mut tracker = tracker(60);
        assert!(tracker.feed(&silence(20)).all(|r| !r.reached_silence));
    }

    #[test]
    fn speech_resets_the_silence_count() {
        let mut tracker = tracker(90);

        let mut audio = speech(1);
        audio.extend(silence(2));
        audio.extend(speech(1));
        audio.extend(silence(2));
        assert!(tracker.feed(&audio).all(|r| !r.reached_silence));

        let results: Vec<_> = tracker.feed(&silence(1)).collect();
        assert!(results[0].reached_silence);
    }

    #[test]
    fn each_utterance_gets_its_own_edge() {
        let mut tracker = tracker(60);
        let mut audio = Vec::new();
        for _ in 0..3 {
            audio.extend(speech(2));
            audio.extend(silence(4));
        }
        let edges = tracker.feed(&audio).filter(|r| r.reached_silence).count();
        assert_eq!(edges, 3);
    }

    #[test]
    fn reset_clears_pending_and_active_state() {
        let mut tracker = tracker(60);
        let _ = tracker.feed(&speech(1)).count();
        let _ = tracker.feed(&[1; 100]).count();
        assert!(tracker.is_speech_active());

        tracker.reset();
        assert!(!tracker.is_speech_active());
        assert_eq!(tracker.pending_bytes(), 0);

        // Silence after a reset must not produce a stale edge.
        assert!(tracker.feed(&silence(5)).all(|r| !r.reached_silence));
    }

    #[test]
    fn dropped_iterator_leaves_frames_pending() {
        let mut tracker = tracker(60);
        let first = tracker.feed(&speech(3)).next();
        assert_eq!(
            first,
            Some(FrameActivity {
                is_speech: true,
                reached_silence: false
            })
        );
        assert_eq!(tracker.pending_bytes(), 2 * FRAME);
        assert_eq!(tracker.feed(&[]).count(), 2);
    }
}
