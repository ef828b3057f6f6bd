//! Phrase consumer that synthesizes audio and streams it to the client.

use std::sync::Arc;

use async_trait::async_trait;

use voxstream_core::{EventSink, ServerEvent, Synthesizer};

use crate::latency::{Checkpoint, LatencyTracker};
use crate::phrase::PhraseConsumer;

/// Synthesizes each phrase and emits its audio as `tts_chunk` events.
///
/// Every handled phrase ends with a `tts_phrase_done` event, including
/// phrases whose synthesis failed.
pub struct SynthesisSink {
    synthesizer: Arc<dyn Synthesizer>,
    events: Arc<dyn EventSink>,
    latency: Arc<LatencyTracker>,
}

impl SynthesisSink {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        events: Arc<dyn EventSink>,
        latency: Arc<LatencyTracker>,
    ) -> Self {
        Self {
            synthesizer,
            events,
            latency,
        }
    }
}

#[async_trait]
impl PhraseConsumer for SynthesisSink {
    async fn handle_phrase(&self, seq: u64, text: &str) {
        if text.is_empty() {
            return;
        }

        match self.synthesizer.synthesize(text).await {
            Ok(chunks) => {
                let mut index: u32 = 0;
                for chunk in chunks.iter().filter(|c| !c.is_empty()) {
                    self.latency.mark_once(Checkpoint::FirstSynthesisAudio);
                    self.events.emit(ServerEvent::tts_chunk(seq, index, chunk));
                    index += 1;
                }
                tracing::debug!(seq, chunks = index, "Phrase synthesized");
            }
            Err(e) => {
                tracing::error!(seq, error = %e, "Speech synthesis failed");
                self.events
                    .emit(ServerEvent::error(format!("TTS failed for seq {seq}")));
            }
        }

        self.events.emit(ServerEvent::TtsPhraseDone { seq });
    }
}

impl std::fmt::Debug for SynthesisSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxstream_core::{ChannelEventSink, VoxError};

    struct FixedSynthesizer(Result<Vec<Vec<u8>>, String>);

    #[async_trait]
    impl Synthesizer for FixedSynthesizer {
        async fn synthesize(&self, _text: &str) -> Result<Vec<Vec<u8>>, VoxError> {
            self.0.clone().map_err(VoxError::Synthesis)
        }
    }

    fn sink_with(
        result: Result<Vec<Vec<u8>>, String>,
    ) -> (
        SynthesisSink,
        tokio::sync::mpsc::UnboundedReceiver<ServerEvent>,
        Arc<LatencyTracker>,
    ) {
        let (events, rx) = ChannelEventSink::new();
        let latency = Arc::new(LatencyTracker::new());
        let sink = SynthesisSink::new(
            Arc::new(FixedSynthesizer(result)),
            Arc::new(events),
            Arc::clone(&latency),
        );
        (sink, rx, latency)
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn chunks_are_indexed_and_followed_by_phrase_done() {
        let (sink, mut rx, latency) = sink_with(Ok(vec![vec![1, 2], Vec::new(), vec![3]]));
        sink.handle_phrase(4, "Hello.").await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ServerEvent::tts_chunk(4, 0, &[1, 2]),
                ServerEvent::tts_chunk(4, 1, &[3]),
                ServerEvent::TtsPhraseDone { seq: 4 },
            ]
        );
        assert!(latency.get(Checkpoint::FirstSynthesisAudio).is_some());
    }

    #[tokio::test]
    async fn failure_reports_the_sequence_and_still_finishes() {
        let (sink, mut rx, latency) = sink_with(Err("voice missing".into()));
        sink.handle_phrase(2, "Oops.").await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ServerEvent::error("TTS failed for seq 2"),
                ServerEvent::TtsPhraseDone { seq: 2 },
            ]
        );
        assert!(latency.get(Checkpoint::FirstSynthesisAudio).is_none());
    }

    #[tokio::test]
    async fn empty_text_is_ignored() {
        let (sink, mut rx, _) = sink_with(Ok(vec![vec![1]]));
        sink.handle_phrase(1, "").await;
        assert!(drain(&mut rx).is_empty());
    }
}
