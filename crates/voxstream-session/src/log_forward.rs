//! Log forwarding sidecar: streams diagnostic lines to connected clients.
//!
//! A single [`SessionLogLayer`] is installed in the process's `tracing`
//! subscriber. It formats every INFO-or-louder event as
//! `LEVEL:target:message` and publishes it to a [`LogHub`]. Each session
//! subscribes a fixed-capacity queue to the hub and runs one forwarding task
//! that drains the queue into `log` events.
//!
//! Producers never block: when a session's queue is full the oldest line is
//! dropped to make room.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use voxstream_core::{EventSink, ServerEvent};

// ── Queue ──────────────────────────────────────────────────────────

/// Bounded drop-oldest queue of formatted log lines.
#[derive(Debug)]
pub struct LogQueue {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    dropped: AtomicU64,
    notify: Notify,
}

impl LogQueue {
    fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Enqueue a line, evicting the oldest one when full.
    pub fn push(&self, line: String) {
        {
            let mut lines = self.lock();
            if lines.len() >= self.capacity {
                lines.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            lines.push_back(line);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    /// Lines currently waiting to be forwarded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lines evicted because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Hub ────────────────────────────────────────────────────────────

/// Fan-out point between the `tracing` layer and per-session queues.
#[derive(Debug, Clone, Default)]
pub struct LogHub {
    subscribers: Arc<Mutex<Vec<Arc<LogQueue>>>>,
}

impl LogHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The `tracing` layer publishing into this hub.
    #[must_use]
    pub fn layer(&self) -> SessionLogLayer {
        SessionLogLayer { hub: self.clone() }
    }

    /// Register a new queue that receives every published line.
    pub fn subscribe(&self, capacity: usize) -> Arc<LogQueue> {
        let queue = Arc::new(LogQueue::new(capacity));
        self.lock().push(Arc::clone(&queue));
        queue
    }

    pub fn unsubscribe(&self, queue: &Arc<LogQueue>) {
        self.lock().retain(|q| !Arc::ptr_eq(q, queue));
    }

    /// Deliver `line` to every subscribed queue.
    pub fn publish(&self, line: &str) {
        for queue in self.lock().iter() {
            queue.push(line.to_string());
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<LogQueue>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── tracing layer ──────────────────────────────────────────────────

/// `tracing_subscriber` layer that publishes INFO+ events to a [`LogHub`].
#[derive(Debug, Clone)]
pub struct SessionLogLayer {
    hub: LogHub,
}

impl<S: Subscriber> Layer<S> for SessionLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // Levels compare by verbosity: DEBUG and TRACE sort above INFO.
        if *meta.level() > Level::INFO || self.hub.subscriber_count() == 0 {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format!("{}:{}:{}", meta.level(), meta.target(), visitor.finish());
        self.hub.publish(&line);
    }
}

/// Collects the `message` field followed by any other fields as `key=value`.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

// ── Forwarder ──────────────────────────────────────────────────────

/// A session's subscription to the hub plus the task draining it.
#[derive(Debug)]
pub struct LogForwarder {
    hub: LogHub,
    queue: Arc<LogQueue>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LogForwarder {
    /// Subscribe to `hub` and spawn the task forwarding lines as `log` events.
    pub fn spawn(hub: &LogHub, capacity: usize, events: Arc<dyn EventSink>) -> Self {
        let queue = hub.subscribe(capacity);
        let cancel = CancellationToken::new();

        let task = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            drain(&queue, events.as_ref());
                            break;
                        }
                        () = queue.notify.notified() => drain(&queue, events.as_ref()),
                    }
                }
            })
        };

        Self {
            hub: hub.clone(),
            queue,
            cancel,
            task: Some(task),
        }
    }

    /// The queue this forwarder drains.
    #[must_use]
    pub fn queue(&self) -> &Arc<LogQueue> {
        &self.queue
    }

    /// Unsubscribe and wait for the forwarding task to exit.
    ///
    /// Lines already queued are forwarded before the task exits.
    pub async fn stop(&mut self) {
        self.hub.unsubscribe(&self.queue);
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

fn drain(queue: &LogQueue, events: &dyn EventSink) {
    while let Some(message) = queue.pop() {
        events.emit(ServerEvent::Log { message });
    }
}

impl Drop for LogForwarder {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.queue);
        self.cancel.cancel();
    }
}
