//! Wire shapes exchanged with the transport layer.
//!
//! Inbound control frames are parsed into [`ClientMessage`]; everything the
//! session sends back is a [`ServerEvent`]. Both serialise as JSON objects
//! discriminated by a `type` field.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// MIME type attached to synthesized audio chunks.
pub const DEFAULT_AUDIO_MIME: &str = "audio/wav";

// ── Inbound ────────────────────────────────────────────────────────

/// A text control frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The client started streaming microphone audio.
    Start {
        /// Sample rate the client is capturing at, if it declared one.
        #[serde(default)]
        sample_rate: Option<u32>,
    },

    /// Finalize the current utterance immediately.
    Stop,

    /// Abandon the reply currently being generated.
    Cancel,

    /// Any other `type` value. Ignored by the session.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// ── Outbound ───────────────────────────────────────────────────────

/// Events emitted by a session to its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Non-fatal notice.
    Info { message: String },

    /// Provisional transcription of in-progress speech.
    PartialTranscript { text: String },

    /// Transcription of a completed utterance.
    FinalTranscript {
        text: String,
        /// `utt-<seq>`, numbered from 1 per session.
        id: String,
    },

    /// One reply token, or the `done` sentinel (which carries no text).
    LlmToken {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        done: bool,
    },

    /// One encoded audio chunk of a phrase.
    TtsChunk {
        seq: u64,
        index: u32,
        audio_b64: String,
        mime: String,
    },

    /// No more chunks will arrive for this phrase.
    TtsPhraseDone { seq: u64 },

    /// All phrases of the reply have been synthesized.
    TtsComplete,

    /// Recoverable failure.
    Error { message: String },

    /// Forwarded diagnostic line.
    Log { message: String },
}

impl ServerEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// A reply token that is not the final sentinel.
    pub fn token(text: impl Into<String>) -> Self {
        Self::LlmToken {
            text: Some(text.into()),
            done: false,
        }
    }

    /// The end-of-reply sentinel.
    pub const fn token_done() -> Self {
        Self::LlmToken {
            text: None,
            done: true,
        }
    }

    /// Encode one synthesized audio chunk as base64.
    pub fn tts_chunk(seq: u64, index: u32, audio: &[u8]) -> Self {
        Self::TtsChunk {
            seq,
            index,
            audio_b64: BASE64.encode(audio),
            mime: DEFAULT_AUDIO_MIME.to_string(),
        }
    }

    /// The wire `type` tag of this event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::PartialTranscript { .. } => "partial_transcript",
            Self::FinalTranscript { .. } => "final_transcript",
            Self::LlmToken { .. } => "llm_token",
            Self::TtsChunk { .. } => "tts_chunk",
            Self::TtsPhraseDone { .. } => "tts_phrase_done",
            Self::TtsComplete => "tts_complete",
            Self::Error { .. } => "error",
            Self::Log { .. } => "log",
        }
    }

    /// Serialise to the JSON text frame sent over the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_start_with_and_without_rate() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"start","sample_rate":48000}"#).unwrap(),
            ClientMessage::Start {
                sample_rate: Some(48_000)
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"start"}"#).unwrap(),
            ClientMessage::Start { sample_rate: None }
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"playback_drained"}"#).unwrap(),
            ClientMessage::Unknown
        );
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(ClientMessage::parse("[1, 2]").is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn token_done_omits_text() {
        let value = serde_json::to_value(ServerEvent::token_done()).unwrap();
        assert_eq!(value, json!({"type": "llm_token", "done": true}));
    }

    #[test]
    fn tts_chunk_is_base64_encoded() {
        let value = serde_json::to_value(ServerEvent::tts_chunk(3, 0, b"RIFF")).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "tts_chunk",
                "seq": 3,
                "index": 0,
                "audio_b64": "UklGRg==",
                "mime": "audio/wav",
            })
        );
    }

    #[test]
    fn unit_events_serialise_with_type_only() {
        assert_eq!(
            ServerEvent::TtsComplete.to_json().unwrap(),
            r#"{"type":"tts_complete"}"#
        );
        assert_eq!(ServerEvent::TtsComplete.kind(), "tts_complete");
    }
}
