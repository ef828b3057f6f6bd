//! Core domain types and port definitions for voxstream.
//!
//! This crate has no knowledge of speech engines or transports. It defines
//! the wire events, conversation turns, settings and error taxonomy shared
//! by the session engine and its adapters, plus the collaborator traits in
//! [`ports`].

pub mod conversation;
pub mod error;
pub mod events;
pub mod ports;
pub mod settings;
pub mod transcript;

pub use conversation::{ChatTurn, Role};
pub use error::VoxError;
pub use events::{ClientMessage, DEFAULT_AUDIO_MIME, ServerEvent};
pub use ports::{
    ChannelEventSink, EventSink, FrameClassifier, NoopEventSink, ReplyGenerator, Synthesizer,
    TokenStream, Transcriber,
};
pub use settings::Settings;
pub use transcript::merge_transcripts;
