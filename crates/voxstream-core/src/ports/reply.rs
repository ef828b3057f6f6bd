//! Reply generation port.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::conversation::ChatTurn;
use crate::error::VoxError;

/// A stream of reply tokens. An `Err` item ends the reply as failed.
pub type TokenStream = BoxStream<'static, Result<String, VoxError>>;

/// Produces a token stream answering the conversation so far.
///
/// The session drops the stream when a reply is cancelled, so
/// implementations should release upstream resources on drop.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Start generating a reply to `history` (oldest turn first).
    async fn stream_reply(&self, history: Vec<ChatTurn>) -> Result<TokenStream, VoxError>;
}
