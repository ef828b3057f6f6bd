//! Streaming voice session: one client conversation from audio to speech.
//!
//! ```text
//!   binary frames ──► ring buffer ──► partial pass (debounced) ──► partial_transcript
//!        │
//!        └──► activity tracker ──(silence edge / "stop")──► finalize ──► final_transcript
//!                                                               │
//!                                                               ▼
//!            llm_token ◄── reply task ──► phrase segmenter ──► synthesis sink ──► tts_chunk
//! ```
//!
//! A [`Session`] is a cheap, cloneable handle. The transport feeds it frames
//! through [`Session::handle_binary`] and [`Session::handle_text`]; every
//! outbound message leaves through the session's [`EventSink`].
//!
//! Partial and final transcription passes are each guarded so that at most
//! one of each runs at a time. A pass that finds its guard taken is skipped,
//! not queued. At most one reply is active; starting a new one cancels the
//! previous one first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use voxstream_core::{
    ChatTurn, ClientMessage, EventSink, FrameClassifier, ReplyGenerator, ServerEvent, Settings,
    Synthesizer, Transcriber, VoxError,
};

use crate::activity::{FrameActivity, SpeechActivityTracker};
use crate::audio_buffer::AudioRingBuffer;
use crate::latency::{Checkpoint, LatencyTracker};
use crate::log_forward::{LogForwarder, LogHub};
use crate::phrase::PhraseSegmenter;
use crate::sink::SynthesisSink;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Collaborators a session is built from.
pub struct SessionParts {
    pub transcriber: Arc<dyn Transcriber>,
    pub replies: Arc<dyn ReplyGenerator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub classifier: Box<dyn FrameClassifier>,
    pub events: Arc<dyn EventSink>,

    /// When set, the session forwards INFO+ log lines to its client.
    pub log_hub: Option<LogHub>,
}

/// How a reply task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The token stream ran to completion.
    Completed,
    /// The reply generator failed.
    Failed,
    /// The reply was cancelled before the stream ended.
    Cancelled,
}

/// Handle to one streaming voice session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    settings: Settings,

    transcriber: Arc<dyn Transcriber>,
    replies: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn Synthesizer>,
    events: Arc<dyn EventSink>,

    audio: Mutex<AudioState>,
    partial_guard: tokio::sync::Mutex<()>,
    finalize_guard: tokio::sync::Mutex<()>,
    partial: Mutex<PartialMemo>,
    /// Bumped by every finalize; partial results captured under an older
    /// value belong to a finished utterance and are discarded.
    utterance: AtomicU64,
    transcript_seq: AtomicU64,

    history: Mutex<Vec<ChatTurn>>,
    latency: Arc<LatencyTracker>,
    reply: tokio::sync::Mutex<Option<ActiveReply>>,

    log_hub: Option<LogHub>,
    log_forwarder: tokio::sync::Mutex<Option<LogForwarder>>,
}

struct AudioState {
    buffer: AudioRingBuffer,
    tracker: SpeechActivityTracker,
}

#[derive(Default)]
struct PartialMemo {
    last_emitted_at: Option<Instant>,
    last_text: String,
}

struct ActiveReply {
    cancel: CancellationToken,
    handle: JoinHandle<ReplyOutcome>,
}

impl Session {
    /// Build a session. Fails if `settings` are invalid.
    pub fn new(settings: Settings, parts: SessionParts) -> Result<Self, VoxError> {
        settings.validate()?;

        let audio = AudioState {
            buffer: AudioRingBuffer::new(settings.sample_rate, settings.buffer_max_s),
            tracker: SpeechActivityTracker::new(
                settings.sample_rate,
                settings.vad_silence_ms,
                parts.classifier,
            ),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                settings,
                transcriber: parts.transcriber,
                replies: parts.replies,
                synthesizer: parts.synthesizer,
                events: parts.events,
                audio: Mutex::new(audio),
                partial_guard: tokio::sync::Mutex::new(()),
                finalize_guard: tokio::sync::Mutex::new(()),
                partial: Mutex::new(PartialMemo::default()),
                utterance: AtomicU64::new(0),
                transcript_seq: AtomicU64::new(0),
                history: Mutex::new(Vec::new()),
                latency: Arc::new(LatencyTracker::new()),
                reply: tokio::sync::Mutex::new(None),
                log_hub: parts.log_hub,
                log_forwarder: tokio::sync::Mutex::new(None),
            }),
        })
    }

    /// Process-unique session number, used in logs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Reset latency checkpoints and start log forwarding if configured.
    pub async fn start(&self) {
        self.inner.latency.clear();

        if let Some(hub) = &self.inner.log_hub {
            let mut forwarder = self.inner.log_forwarder.lock().await;
            if forwarder.is_none() {
                *forwarder = Some(LogForwarder::spawn(
                    hub,
                    self.inner.settings.log_queue_capacity,
                    Arc::clone(&self.inner.events),
                ));
            }
        }

        tracing::info!(session = self.inner.id, "Session started");
    }

    // ── Inbound frames ─────────────────────────────────────────────

    /// Handle a text frame carrying a JSON control message.
    ///
    /// Malformed messages are logged and dropped; unknown types are ignored.
    pub async fn handle_text(&self, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session = self.inner.id, error = %e, "Dropping malformed control message");
                return;
            }
        };

        match message {
            ClientMessage::Start { sample_rate } => self.on_start_signal(sample_rate),
            ClientMessage::Stop => self.finalize().await,
            ClientMessage::Cancel => self.cancel_reply().await,
            ClientMessage::Unknown => {
                tracing::debug!(session = self.inner.id, "Ignoring unknown control message");
            }
        }
    }

    /// Handle a binary frame of PCM16 LE mono audio.
    pub async fn handle_binary(&self, data: &[u8]) {
        self.on_audio_chunk(data).await;
    }

    /// Record the start of capture and warn the client about a rate mismatch.
    pub fn on_start_signal(&self, declared_rate: Option<u32>) {
        self.inner.latency.mark(Checkpoint::AudioStart);

        let expected = self.inner.settings.sample_rate;
        if let Some(declared) = declared_rate.filter(|rate| *rate != 0 && *rate != expected) {
            tracing::warn!(
                session = self.inner.id,
                expected,
                declared,
                "Client sample rate mismatch"
            );
            self.inner.events.emit(ServerEvent::info(format!(
                "Server expects {expected}Hz; received {declared}Hz."
            )));
        }
    }

    /// Buffer an audio chunk and react to the speech activity it contains.
    ///
    /// Speech frames may trigger a partial pass; a completed silence run
    /// finalizes the utterance. A chunk with an odd byte count is dropped.
    pub async fn on_audio_chunk(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.inner.latency.mark_once(Checkpoint::AudioStart);

        let frames: Vec<FrameActivity> = {
            let mut audio = self.inner.lock_audio();
            if let Err(e) = audio.buffer.append(data) {
                tracing::warn!(session = self.inner.id, error = %e, "Dropping audio chunk");
                return;
            }
            audio.tracker.feed(data).collect()
        };

        for frame in frames {
            if frame.is_speech {
                self.maybe_emit_partial().await;
            }
            if frame.reached_silence {
                self.finalize().await;
            }
        }
    }

    // ── Transcription passes ───────────────────────────────────────

    /// Transcribe the recent window and emit it as a partial transcript.
    ///
    /// Skipped when called within the debounce interval or while another
    /// partial pass is running. Empty and repeated text is not emitted.
    pub async fn maybe_emit_partial(&self) {
        let inner = &self.inner;
        let now = Instant::now();
        let interval = inner.settings.partial_interval();
        {
            let memo = inner.lock_partial();
            if memo
                .last_emitted_at
                .is_some_and(|last| now.duration_since(last) < interval)
            {
                return;
            }
        }

        let Ok(_guard) = inner.partial_guard.try_lock() else {
            return;
        };

        let (window, utterance) = {
            let audio = inner.lock_audio();
            (
                audio.buffer.get_window(inner.settings.partial_window_s),
                inner.utterance.load(Ordering::SeqCst),
            )
        };
        if window.is_empty() {
            return;
        }

        let text = match inner
            .transcriber
            .transcribe(&window, inner.settings.transcribe_temperature)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(session = inner.id, error = %e, "Partial transcription failed");
                inner
                    .events
                    .emit(ServerEvent::error("Partial transcription failed"));
                return;
            }
        };

        if inner.utterance.load(Ordering::SeqCst) != utterance {
            tracing::debug!(session = inner.id, "Discarding partial for a finalized utterance");
            return;
        }

        {
            let mut memo = inner.lock_partial();
            if text.trim().is_empty() || text == memo.last_text {
                return;
            }
            memo.last_emitted_at = Some(now);
            memo.last_text.clone_from(&text);
        }

        inner.latency.mark_once(Checkpoint::FirstPartial);
        inner.events.emit(ServerEvent::PartialTranscript { text });
    }

    /// Close the current utterance: transcribe it, record the user turn and
    /// start a reply.
    ///
    /// The buffer and activity state are cleared even when nothing is
    /// transcribed. Skipped if another finalize is running.
    pub async fn finalize(&self) {
        let inner = &self.inner;
        let Ok(_guard) = inner.finalize_guard.try_lock() else {
            tracing::debug!(session = inner.id, "Finalize already in progress");
            return;
        };

        let window = {
            let mut audio = inner.lock_audio();
            let window = audio.buffer.get_window(inner.settings.final_window_s);
            audio.buffer.clear();
            audio.tracker.reset();
            window
        };
        inner.utterance.fetch_add(1, Ordering::SeqCst);
        inner.lock_partial().last_text.clear();

        if window.is_empty() {
            return;
        }

        let text = match inner
            .transcriber
            .transcribe(&window, inner.settings.transcribe_temperature)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(session = inner.id, error = %e, "Final transcription failed");
                inner
                    .events
                    .emit(ServerEvent::error("Final transcription failed"));
                return;
            }
        };
        if text.trim().is_empty() {
            return;
        }

        inner.latency.mark(Checkpoint::FinalTranscript);
        let seq = inner.transcript_seq.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(session = inner.id, seq, "Final transcript");
        inner.events.emit(ServerEvent::FinalTranscript {
            text: text.clone(),
            id: format!("utt-{seq}"),
        });
        inner.lock_history().push(ChatTurn::user(text));

        self.start_reply().await;
    }

    // ── Replies ────────────────────────────────────────────────────

    /// Cancel any active reply and start streaming a new one over the
    /// current history.
    pub async fn start_reply(&self) {
        let mut slot = self.inner.reply.lock().await;
        self.inner.cancel_active(&mut slot).await;

        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(Arc::new(SynthesisSink::new(
            Arc::clone(&self.inner.synthesizer),
            Arc::clone(&self.inner.events),
            Arc::clone(&self.inner.latency),
        )));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_reply(
            Arc::clone(&self.inner),
            segmenter,
            cancel.clone(),
        ));
        *slot = Some(ActiveReply { cancel, handle });
    }

    /// Cancel the active reply, if any, and wait for it to wind down.
    ///
    /// Does nothing when no reply is running.
    pub async fn cancel_reply(&self) {
        let mut slot = self.inner.reply.lock().await;
        self.inner.cancel_active(&mut slot).await;
    }

    /// Wait for the active reply to end on its own.
    ///
    /// Returns `None` when no reply was active.
    pub async fn finish_reply(&self) -> Option<ReplyOutcome> {
        let active = self.inner.reply.lock().await.take()?;
        match active.handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(session = self.inner.id, error = %e, "Reply task ended abnormally");
                None
            }
        }
    }

    /// Whether a reply task is currently running.
    pub async fn is_replying(&self) -> bool {
        self.inner
            .reply
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// Cancel any reply, log latency figures and stop log forwarding.
    pub async fn close(&self) {
        self.cancel_reply().await;
        self.log_latency();

        let forwarder = self.inner.log_forwarder.lock().await.take();
        if let Some(mut forwarder) = forwarder {
            forwarder.stop().await;
        }
        tracing::debug!(session = self.inner.id, "Session closed");
    }

    fn log_latency(&self) {
        if self.inner.latency.get(Checkpoint::AudioStart).is_none() {
            return;
        }
        let summary = self
            .inner
            .latency
            .deltas_ms()
            .iter()
            .map(|(checkpoint, ms)| format!("{}={ms:.2}", checkpoint.as_str()))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(session = self.inner.id, "Latency ms: {summary}");
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Snapshot of the conversation so far.
    #[must_use]
    pub fn history(&self) -> Vec<ChatTurn> {
        self.inner.lock_history().clone()
    }

    #[must_use]
    pub fn latency(&self) -> &LatencyTracker {
        &self.inner.latency
    }

    /// Samples currently held in the audio buffer.
    #[must_use]
    pub fn buffered_samples(&self) -> usize {
        self.inner.lock_audio().buffer.total_samples()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn cancel_active(&self, slot: &mut Option<ActiveReply>) {
        let Some(active) = slot.take() else {
            return;
        };
        if active.handle.is_finished() {
            return;
        }

        active.cancel.cancel();
        match active.handle.await {
            Ok(outcome) => tracing::debug!(session = self.id, ?outcome, "Reply task stopped"),
            Err(e) => tracing::warn!(session = self.id, error = %e, "Reply task ended abnormally"),
        }
        tracing::info!(session = self.id, "Reply cancelled");
        self.events.emit(ServerEvent::info("Reply cancelled"));
    }

    fn lock_audio(&self) -> MutexGuard<'_, AudioState> {
        self.audio.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_partial(&self) -> MutexGuard<'_, PartialMemo> {
        self.partial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<ChatTurn>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stream one reply: forward tokens, feed the segmenter, then flush speech.
///
/// The closing `tts_complete` and `llm_token { done }` events are sent on
/// every path, cancellation included. Only a completed reply is recorded in
/// the history.
async fn run_reply(
    inner: Arc<Inner>,
    mut segmenter: PhraseSegmenter,
    cancel: CancellationToken,
) -> ReplyOutcome {
    let history = inner.lock_history().clone();
    let mut reply_text = String::new();

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => ReplyOutcome::Cancelled,
        result = stream_tokens(&inner, history, &mut segmenter, &mut reply_text) => match result {
            Ok(()) => ReplyOutcome::Completed,
            Err(e) if e.is_cancelled() => ReplyOutcome::Cancelled,
            Err(e) => {
                tracing::error!(session = inner.id, error = %e, "Reply generation failed");
                inner.events.emit(ServerEvent::error("LLM failed"));
                ReplyOutcome::Failed
            }
        },
    };

    let outcome = if outcome == ReplyOutcome::Cancelled {
        // Cancelled while streaming: what was already generated is still spoken.
        segmenter.flush().await;
        outcome
    } else {
        let interrupted = tokio::select! {
            biased;
            () = cancel.cancelled() => true,
            () = segmenter.flush() => false,
        };
        if interrupted {
            tracing::info!(session = inner.id, "Reply cancelled while speaking");
            segmenter.stop().await;
            ReplyOutcome::Cancelled
        } else {
            outcome
        }
    };

    inner.events.emit(ServerEvent::TtsComplete);
    inner.events.emit(ServerEvent::token_done());

    if outcome == ReplyOutcome::Completed {
        let text = reply_text.trim();
        if !text.is_empty() {
            inner.lock_history().push(ChatTurn::assistant(text));
        }
    }
    outcome
}

async fn stream_tokens(
    inner: &Inner,
    history: Vec<ChatTurn>,
    segmenter: &mut PhraseSegmenter,
    reply_text: &mut String,
) -> Result<(), VoxError> {
    let mut tokens = inner.replies.stream_reply(history).await?;
    while let Some(token) = tokens.next().await {
        let token = token?;
        if token.is_empty() {
            continue;
        }
        inner.latency.mark_once(Checkpoint::FirstReplyToken);
        inner.events.emit(ServerEvent::token(token.as_str()));
        reply_text.push_str(&token);
        segmenter.add_token(&token);
    }
    Ok(())
}
