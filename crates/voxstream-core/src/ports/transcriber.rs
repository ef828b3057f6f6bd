//! Speech-to-text port.

use async_trait::async_trait;

use crate::error::VoxError;

/// Transcribes a window of PCM audio to text.
///
/// Implementations must be `Send + Sync`: partial and final transcription
/// passes of one session, and passes of different sessions, may call the
/// same instance concurrently.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `pcm` (mono PCM16 LE at the session sample rate).
    ///
    /// Returns an empty string when no speech was recognised.
    async fn transcribe(&self, pcm: &[u8], temperature: f32) -> Result<String, VoxError>;
}
