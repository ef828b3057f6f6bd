//! Command-line harness for voxstream.
//!
//! Replays recorded audio through a [`voxstream_session::Session`]. The
//! recognizer and voice are stand-in engines running on the blocking worker
//! pools, so the streaming turn lifecycle can be observed without speech
//! models; replies stream from an OpenAI-compatible API when one is
//! configured and echo the user otherwise.

pub mod parser;
pub mod replay;
pub mod stack;

pub use parser::Cli;
pub use replay::{ReplayOptions, ReplaySummary, chunk_bytes, replay};
