//! Text-to-speech port.

use async_trait::async_trait;

use crate::error::VoxError;

/// Synthesizes one phrase into encoded audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text`, returning the encoded audio split into the chunks
    /// that should be sent to the client, in playback order.
    ///
    /// An empty vector means the engine produced no audio.
    async fn synthesize(&self, text: &str) -> Result<Vec<Vec<u8>>, VoxError>;
}
