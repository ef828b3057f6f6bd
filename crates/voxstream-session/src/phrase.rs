//! Phrase segmentation. Groups reply tokens into speakable phrases and
//! hands them to a synthesis consumer strictly one at a time, in order.
//!
//! ```text
//!   add_token ──► pending text ──(.?! or 60 chars)──► queue ──► dispatch task ──► consumer
//!                                                       ▲
//!   flush ──► seal remainder ──► Terminal ──────────────┘   (flush awaits the task)
//! ```
//!
//! Token arrival and synthesis run at different speeds; the queue absorbs
//! the difference while the single dispatch task guarantees phrase `n + 1`
//! is not handed over before the consumer returned from phrase `n`.
//!
//! [`PhraseSegmenter::stop`] abandons the queue: the phrase being handled
//! finishes, nothing after it is dispatched.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Characters that end a phrase.
pub const DEFAULT_TERMINATORS: &str = ".?!";

/// Pending text at or beyond this many characters is sealed even without
/// a terminator.
pub const MAX_PHRASE_CHARS: usize = 60;

/// A sealed, speakable segment of reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    /// Position within the reply, starting at 1.
    pub seq: u64,
    pub text: String,
}

/// Receives phrases from the dispatch task.
#[async_trait]
pub trait PhraseConsumer: Send + Sync {
    /// Handle one phrase. The next phrase is not dispatched until this returns.
    async fn handle_phrase(&self, seq: u64, text: &str);
}

/// Items on the dispatch queue.
#[derive(Debug)]
enum Dispatch {
    Phrase(Phrase),
    /// End of the reply. The dispatch task exits after observing it.
    Terminal,
}

/// Token-to-phrase segmenter with an ordered dispatch task.
#[derive(Debug)]
pub struct PhraseSegmenter {
    terminators: Vec<char>,
    max_chars: usize,
    pending: String,
    last_seq: u64,
    queue_tx: mpsc::UnboundedSender<Dispatch>,
    /// Taken by `start`; phrases sealed before then wait in the channel.
    queue_rx: Option<mpsc::UnboundedReceiver<Dispatch>>,
    dispatcher: Option<JoinHandle<()>>,
    halt: CancellationToken,
}

impl PhraseSegmenter {
    /// Create a segmenter using the default terminators and length cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_TERMINATORS, MAX_PHRASE_CHARS)
    }

    /// Create a segmenter with custom phrase boundaries.
    #[must_use]
    pub fn with_rules(terminators: &str, max_chars: usize) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            terminators: terminators.chars().collect(),
            max_chars,
            pending: String::new(),
            last_seq: 0,
            queue_tx,
            queue_rx: Some(queue_rx),
            dispatcher: None,
            halt: CancellationToken::new(),
        }
    }

    /// Spawn the dispatch task delivering phrases to `consumer`.
    ///
    /// Calling `start` again, even after `flush`, does nothing.
    pub fn start(&mut self, consumer: Arc<dyn PhraseConsumer>) {
        let Some(mut queue_rx) = self.queue_rx.take() else {
            return;
        };

        let halt = self.halt.clone();
        self.dispatcher = Some(tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    () = halt.cancelled() => break,
                    item = queue_rx.recv() => item,
                };
                match item {
                    Some(Dispatch::Phrase(phrase)) => {
                        tracing::trace!(seq = phrase.seq, "Dispatching phrase");
                        consumer.handle_phrase(phrase.seq, &phrase.text).await;
                    }
                    Some(Dispatch::Terminal) | None => break,
                }
            }
        }));
    }

    /// Append a reply token, sealing a phrase when a boundary is reached.
    pub fn add_token(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        self.pending.push_str(token);

        let text = self.pending.trim();
        let Some(last) = text.chars().last() else {
            return;
        };
        if self.terminators.contains(&last) || text.chars().count() >= self.max_chars {
            let text = text.to_string();
            self.pending.clear();
            self.seal(text);
        }
    }

    /// Seal any remaining text, then wait until every queued phrase has been
    /// handled by the consumer.
    ///
    /// Does nothing if the segmenter was never started or already flushed.
    /// Dropping the returned future part way leaves the dispatch task
    /// running; follow up with [`flush`](Self::flush) or [`stop`](Self::stop).
    pub async fn flush(&mut self) {
        if self.dispatcher.is_none() {
            return;
        }

        let text = self.pending.trim().to_string();
        self.pending.clear();
        if !text.is_empty() {
            self.seal(text);
        }
        let _ = self.queue_tx.send(Dispatch::Terminal);

        self.join_dispatcher().await;
    }

    /// Drop every phrase not yet handed to the consumer and wait for the one
    /// in flight, if any.
    ///
    /// Unsealed text is discarded. The segmenter dispatches nothing afterwards.
    pub async fn stop(&mut self) {
        self.pending.clear();
        self.halt.cancel();
        self.join_dispatcher().await;
    }

    /// Sequence number of the most recently sealed phrase (0 if none).
    #[must_use]
    pub const fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Text accumulated since the last sealed phrase.
    #[must_use]
    pub fn pending_text(&self) -> &str {
        &self.pending
    }

    async fn join_dispatcher(&mut self) {
        let Some(dispatcher) = self.dispatcher.as_mut() else {
            return;
        };
        let result = dispatcher.await;
        self.dispatcher = None;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Phrase dispatch task ended abnormally");
        }
    }

    fn seal(&mut self, text: String) {
        self.last_seq += 1;
        let phrase = Phrase {
            seq: self.last_seq,
            text,
        };
        tracing::debug!(seq = phrase.seq, chars = phrase.text.len(), "Sealed phrase");
        // The receiver only goes away once the dispatch task has exited.
        let _ = self.queue_tx.send(Dispatch::Phrase(phrase));
    }
}

impl Default for PhraseSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records phrases; sleeps `delay_for_first` while handling phrase 1.
    #[derive(Default)]
    struct Recorder {
        phrases: Mutex<Vec<Phrase>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay_for_first: Option<Duration>,
    }

    impl Recorder {
        fn slow_first(delay: Duration) -> Self {
            Self {
                delay_for_first: Some(delay),
                ..Self::default()
            }
        }

        fn phrases(&self) -> Vec<Phrase> {
            self.phrases.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PhraseConsumer for Recorder {
        async fn handle_phrase(&self, seq: u64, text: &str) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if seq == 1 {
                if let Some(delay) = self.delay_for_first {
                    tokio::time::sleep(delay).await;
                }
            }
            self.phrases.lock().unwrap().push(Phrase {
                seq,
                text: text.to_string(),
            });
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn phrase(seq: u64, text: &str) -> Phrase {
        Phrase {
            seq,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn punctuation_seals_a_phrase() {
        let recorder = Arc::new(Recorder::default());
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());

        segmenter.add_token("Hello ");
        segmenter.add_token("world.");
        segmenter.flush().await;

        assert_eq!(recorder.phrases(), vec![phrase(1, "Hello world.")]);
    }

    #[tokio::test]
    async fn flush_seals_unterminated_remainder() {
        let recorder = Arc::new(Recorder::default());
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());

        for token in ["no ", "punctuation ", "here "] {
            segmenter.add_token(token);
        }
        assert_eq!(segmenter.last_seq(), 0);
        segmenter.flush().await;

        assert_eq!(recorder.phrases(), vec![phrase(1, "no punctuation here")]);
    }

    #[tokio::test]
    async fn length_cap_seals_long_text() {
        let recorder = Arc::new(Recorder::default());
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());

        let word = "abcdefghij ";
        for _ in 0..6 {
            segmenter.add_token(word);
        }
        // 6 × 10 visible chars plus 5 inner spaces = 65 ≥ 60 after the 6th token.
        assert_eq!(segmenter.last_seq(), 1);
        segmenter.add_token("tail");
        segmenter.flush().await;

        let phrases = recorder.phrases();
        assert_eq!(phrases.len(), 2);
        assert!(phrases[0].text.chars().count() >= MAX_PHRASE_CHARS);
        assert_eq!(phrases[1], phrase(2, "tail"));
    }

    #[tokio::test]
    async fn sequence_numbers_increase_per_phrase() {
        let recorder = Arc::new(Recorder::default());
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());

        for token in ["One.", " Two?", " Three!", " four"] {
            segmenter.add_token(token);
        }
        segmenter.flush().await;

        assert_eq!(
            recorder.phrases(),
            vec![
                phrase(1, "One."),
                phrase(2, "Two?"),
                phrase(3, "Three!"),
                phrase(4, "four"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_first_phrase_still_precedes_second() {
        let recorder = Arc::new(Recorder::slow_first(Duration::from_secs(2)));
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());

        segmenter.add_token("First.");
        segmenter.add_token("Second.");
        segmenter.flush().await;

        assert_eq!(
            recorder.phrases(),
            vec![phrase(1, "First."), phrase(2, "Second.")]
        );
        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn phrases_sealed_before_start_are_delivered() {
        let recorder = Arc::new(Recorder::default());
        let mut segmenter = PhraseSegmenter::new();
        segmenter.add_token("Early.");
        segmenter.start(recorder.clone());
        segmenter.flush().await;

        assert_eq!(recorder.phrases(), vec![phrase(1, "Early.")]);
    }

    #[test]
    fn flush_without_start_is_a_no_op() {
        let mut segmenter = PhraseSegmenter::new();
        segmenter.add_token("dangling");
        tokio_test::block_on(segmenter.flush());
        assert_eq!(segmenter.last_seq(), 0);
        assert_eq!(segmenter.pending_text(), "dangling");
    }

    #[tokio::test]
    async fn empty_and_blank_tokens_do_not_seal() {
        let recorder = Arc::new(Recorder::default());
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());

        segmenter.add_token("");
        segmenter.add_token("   ");
        segmenter.flush().await;

        assert!(recorder.phrases().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_finishes_the_phrase_in_flight_and_drops_the_rest() {
        let recorder = Arc::new(Recorder::slow_first(Duration::from_secs(2)));
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());

        for token in ["One.", " Two.", " Three.", " four"] {
            segmenter.add_token(token);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        segmenter.stop().await;

        assert_eq!(recorder.phrases(), vec![phrase(1, "One.")]);
        assert_eq!(segmenter.pending_text(), "");

        segmenter.add_token("Late.");
        segmenter.flush().await;
        assert_eq!(recorder.phrases().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_flush_can_be_stopped() {
        let recorder = Arc::new(Recorder::slow_first(Duration::from_secs(2)));
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());
        segmenter.add_token("One.");
        segmenter.add_token(" Two.");

        let flushed =
            tokio::time::timeout(Duration::from_millis(500), segmenter.flush()).await;
        assert!(flushed.is_err());
        segmenter.stop().await;

        assert_eq!(recorder.phrases(), vec![phrase(1, "One.")]);
    }

    #[tokio::test]
    async fn second_flush_is_a_no_op() {
        let recorder = Arc::new(Recorder::default());
        let mut segmenter = PhraseSegmenter::new();
        segmenter.start(recorder.clone());
        segmenter.add_token("Once.");
        segmenter.flush().await;
        segmenter.flush().await;

        assert_eq!(recorder.phrases().len(), 1);
    }
}
