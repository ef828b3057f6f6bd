//! Port definitions (trait abstractions) for the session's collaborators.
//!
//! The session engine only ever talks to speech engines, reply generators
//! and the transport through these traits.
//!
//! # Design Rules
//!
//! - No engine or transport types in any signature
//! - Audio crosses ports as raw little-endian PCM16 bytes
//! - Async where the collaborator does I/O or blocking inference; sync for
//!   per-frame classification and event emission, which must never suspend

pub mod classifier;
pub mod event_sink;
pub mod reply;
pub mod synthesizer;
pub mod transcriber;

pub use classifier::FrameClassifier;
pub use event_sink::{ChannelEventSink, EventSink, NoopEventSink};
pub use reply::{ReplyGenerator, TokenStream};
pub use synthesizer::Synthesizer;
pub use transcriber::Transcriber;
