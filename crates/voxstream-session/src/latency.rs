//! Per-session latency checkpoints.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::time::Instant;

/// Named points on the voice turn timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Checkpoint {
    /// First audio (or the start signal) of the session.
    AudioStart,
    FirstPartial,
    /// Most recent final transcript.
    FinalTranscript,
    FirstReplyToken,
    FirstSynthesisAudio,
}

impl Checkpoint {
    /// Checkpoints reported relative to [`Checkpoint::AudioStart`].
    pub const STAGES: [Self; 4] = [
        Self::FirstPartial,
        Self::FinalTranscript,
        Self::FirstReplyToken,
        Self::FirstSynthesisAudio,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AudioStart => "audio_start",
            Self::FirstPartial => "first_partial",
            Self::FinalTranscript => "final_transcript",
            Self::FirstReplyToken => "first_reply_token",
            Self::FirstSynthesisAudio => "first_synthesis_audio",
        }
    }
}

/// Thread-safe map of checkpoint → timestamp.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    marks: Mutex<HashMap<Checkpoint, Instant>>,
}

impl LatencyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `checkpoint` now, replacing any earlier timestamp.
    pub fn mark(&self, checkpoint: Checkpoint) {
        self.lock().insert(checkpoint, Instant::now());
    }

    /// Record `checkpoint` now unless it was already recorded.
    ///
    /// Returns whether this call recorded it.
    pub fn mark_once(&self, checkpoint: Checkpoint) -> bool {
        let mut marks = self.lock();
        if marks.contains_key(&checkpoint) {
            return false;
        }
        marks.insert(checkpoint, Instant::now());
        true
    }

    #[must_use]
    pub fn get(&self, checkpoint: Checkpoint) -> Option<Instant> {
        self.lock().get(&checkpoint).copied()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Milliseconds from audio start to each recorded stage, in timeline order.
    ///
    /// Empty when audio start was never recorded.
    #[must_use]
    pub fn deltas_ms(&self) -> Vec<(Checkpoint, f64)> {
        let marks = self.lock();
        let Some(start) = marks.get(&Checkpoint::AudioStart).copied() else {
            return Vec::new();
        };
        Checkpoint::STAGES
            .iter()
            .filter_map(|stage| {
                marks.get(stage).map(|at| {
                    let ms = at.saturating_duration_since(start).as_secs_f64() * 1000.0;
                    (*stage, (ms * 100.0).round() / 100.0)
                })
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Checkpoint, Instant>> {
        self.marks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
