//! Replay a recorded PCM file through a session.
//!
//! The replay stands in for a WebSocket client: it sends a `start` message,
//! streams the audio in fixed-size frames, sends `stop`, waits for the reply
//! to finish and then closes the session. Every event the session emits is
//! written to `out` as one JSON line.
//!
//! Recognition and synthesis run on blocking engine pools sized from
//! [`Settings`]; replies come from the chat API when one is configured.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc::UnboundedReceiver;

use voxstream_core::{ChannelEventSink, ServerEvent, Settings};
use voxstream_session::{EnergyClassifier, LogHub, Session, SessionParts};

use crate::stack::{self, Collaborators};

/// How the audio is replayed.
#[derive(Clone)]
pub struct ReplayOptions {
    /// Text the stand-in recognizer reports for windows containing speech.
    pub say: String,
    pub chunk_ms: u32,
    /// Sleep `chunk_ms` between frames.
    pub realtime: bool,
    pub vad_sensitivity: f32,
    /// Rate announced in the start message; the session rate when unset.
    pub declared_rate: Option<u32>,
    /// Skip synthesis; no `tts_chunk` events are sent.
    pub mute: bool,
    pub openai_api_key: Option<String>,
}

impl fmt::Debug for ReplayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayOptions")
            .field("say", &self.say)
            .field("chunk_ms", &self.chunk_ms)
            .field("realtime", &self.realtime)
            .field("vad_sensitivity", &self.vad_sensitivity)
            .field("declared_rate", &self.declared_rate)
            .field("mute", &self.mute)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Event counts from one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub partial_transcripts: usize,
    pub final_transcripts: usize,
    pub replies: usize,
    pub audio_chunks: usize,
    pub errors: usize,
}

impl ReplaySummary {
    fn record(&mut self, event: &ServerEvent) {
        self.events += 1;
        match event {
            ServerEvent::PartialTranscript { .. } => self.partial_transcripts += 1,
            ServerEvent::FinalTranscript { .. } => self.final_transcripts += 1,
            ServerEvent::LlmToken { done: true, .. } => self.replies += 1,
            ServerEvent::TtsChunk { .. } => self.audio_chunks += 1,
            ServerEvent::Error { .. } => self.errors += 1,
            _ => {}
        }
    }
}

/// Bytes of PCM16 mono audio in one `chunk_ms` frame (at least one sample).
#[must_use]
pub fn chunk_bytes(sample_rate: u32, chunk_ms: u32) -> usize {
    let samples = u64::from(sample_rate) * u64::from(chunk_ms) / 1000;
    usize::try_from(samples.max(1)).unwrap_or(usize::MAX / 2) * 2
}

/// Stream `audio` through a new session and write its events to `out`.
pub async fn replay<W: Write>(
    settings: Settings,
    audio: &[u8],
    options: &ReplayOptions,
    log_hub: Option<LogHub>,
    out: &mut W,
) -> anyhow::Result<ReplaySummary> {
    let sample_rate = settings.sample_rate;
    let frame_bytes = chunk_bytes(sample_rate, options.chunk_ms);
    let classifier = EnergyClassifier::from_sensitivity(options.vad_sensitivity);

    let Collaborators {
        transcriber,
        replies,
        synthesizer,
    } = stack::build(&settings, options, classifier.threshold())
        .context("Failed to start the speech engines")?;

    let (sink, mut events) = ChannelEventSink::new();
    let session = Session::new(
        settings,
        SessionParts {
            transcriber,
            replies,
            synthesizer,
            classifier: Box::new(classifier),
            events: Arc::new(sink),
            log_hub,
        },
    )
    .context("Invalid session settings")?;

    tracing::info!(
        session = session.id(),
        bytes = audio.len(),
        frame_bytes,
        "Replaying audio"
    );

    session.start().await;
    let start = serde_json::json!({
        "type": "start",
        "sample_rate": options.declared_rate.unwrap_or(sample_rate),
    });
    session.handle_text(&start.to_string()).await;

    let mut summary = ReplaySummary::default();
    let pause = Duration::from_millis(u64::from(options.chunk_ms));
    for frame in audio.chunks(frame_bytes) {
        session.handle_binary(frame).await;
        write_pending(&mut events, out, &mut summary)?;
        if options.realtime {
            tokio::time::sleep(pause).await;
        }
    }

    session.handle_text(r#"{"type":"stop"}"#).await;
    if let Some(outcome) = session.finish_reply().await {
        tracing::debug!(session = session.id(), ?outcome, "Final reply finished");
    }
    session.close().await;
    write_pending(&mut events, out, &mut summary)?;

    Ok(summary)
}

fn write_pending<W: Write>(
    events: &mut UnboundedReceiver<ServerEvent>,
    out: &mut W,
    summary: &mut ReplaySummary,
) -> anyhow::Result<()> {
    while let Ok(event) = events.try_recv() {
        summary.record(&event);
        writeln!(out, "{}", event.to_json()?)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_covers_whole_samples() {
        assert_eq!(chunk_bytes(16_000, 20), 640);
        assert_eq!(chunk_bytes(16_000, 0), 2);
        assert_eq!(chunk_bytes(44_100, 10), 882);
    }

    #[test]
    fn summary_counts_event_kinds() {
        let mut summary = ReplaySummary::default();
        for event in [
            ServerEvent::PartialTranscript { text: "a".into() },
            ServerEvent::FinalTranscript {
                text: "a".into(),
                id: "utt-1".into(),
            },
            ServerEvent::token("a "),
            ServerEvent::token_done(),
            ServerEvent::tts_chunk(1, 0, b"RIFF"),
            ServerEvent::error("LLM failed"),
        ] {
            summary.record(&event);
        }

        assert_eq!(
            summary,
            ReplaySummary {
                events: 6,
                partial_transcripts: 1,
                final_transcripts: 1,
                replies: 1,
                audio_chunks: 1,
                errors: 1,
            }
        );
    }

    #[test]
    fn debug_output_hides_the_api_key() {
        let options = ReplayOptions {
            say: "hi".into(),
            chunk_ms: 20,
            realtime: false,
            vad_sensitivity: 0.5,
            declared_rate: None,
            mute: false,
            openai_api_key: Some("sk-secret".into()),
        };
        let rendered = format!("{options:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("sk-secret"));
    }
}
