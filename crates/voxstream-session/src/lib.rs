//! Streaming voice session engine.
//!
//! Turns a live PCM16 audio stream into partial and final transcripts,
//! streams a reply for every finalized utterance and speaks that reply
//! phrase by phrase. Speech models, the language model and the transport
//! are all reached through the ports defined in `voxstream-core`.
//!
//! # Architecture
//!
//! - [`audio_buffer`]: bounded ring buffer of recent audio
//! - [`activity`]: fixed-frame voice activity tracking
//! - [`phrase`]: token-to-phrase segmentation with ordered dispatch
//! - [`session`]: the per-client orchestrator
//! - [`worker_pool`] / [`engines`]: blocking model runtimes behind async ports
//! - [`openai`]: streaming replies from an OpenAI-compatible chat API

pub mod activity;
pub mod audio_buffer;
pub mod energy;
pub mod engines;
pub mod fallback;
pub mod latency;
pub mod log_forward;
pub mod openai;
pub mod phrase;
pub mod session;
pub mod sink;
pub mod worker_pool;

pub use activity::{FRAME_MS, FrameActivity, SpeechActivityTracker};
pub use audio_buffer::AudioRingBuffer;
pub use energy::EnergyClassifier;
pub use engines::{BlockingSynthesizer, BlockingTranscriber, SpeechEngine, SpeechRecognizer};
pub use fallback::{EchoReplyGenerator, FixedRecognizer, SilentSynthesizer, ToneEngine};
pub use latency::{Checkpoint, LatencyTracker};
pub use log_forward::{LogForwarder, LogHub, SessionLogLayer};
pub use openai::{DEFAULT_OPENAI_BASE_URL, OpenAiConfig, OpenAiReplyGenerator};
pub use phrase::{Phrase, PhraseConsumer, PhraseSegmenter};
pub use session::{ReplyOutcome, Session, SessionParts};
pub use sink::SynthesisSink;
pub use worker_pool::{EngineFactory, EnginePool};
