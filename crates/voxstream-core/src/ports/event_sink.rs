//! Outbound event port.
//!
//! Emission is synchronous and must not block: the session emits from inside
//! audio intake and from the reply task. Transports forward events to the
//! client from their own task.

use tokio::sync::mpsc;

use crate::events::ServerEvent;

/// Receives every event a session sends to its client.
pub trait EventSink: Send + Sync {
    /// Deliver an event. Best-effort: a disconnected client is not an error.
    fn emit(&self, event: ServerEvent);
}

/// Forwards events into an unbounded channel drained by the transport.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver the transport drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Session event receiver dropped");
        }
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: ServerEvent) {}
}
