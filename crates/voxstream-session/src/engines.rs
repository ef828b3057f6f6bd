//! Blocking speech engines and their async adapters.
//!
//! [`SpeechRecognizer`] and [`SpeechEngine`] describe synchronous,
//! thread-bound model runtimes. [`BlockingTranscriber`] and
//! [`BlockingSynthesizer`] run them on an [`EnginePool`] and expose them
//! through the session's async [`Transcriber`] and [`Synthesizer`] ports.

use async_trait::async_trait;

use voxstream_core::{Synthesizer, Transcriber, VoxError, merge_transcripts};

use crate::worker_pool::{EngineFactory, EnginePool};

/// Synchronous speech-to-text model owned by a single worker thread.
pub trait SpeechRecognizer {
    /// Recognise speech in 16 kHz mono samples normalised to `[-1.0, 1.0)`.
    ///
    /// # Arguments
    /// * `audio`: PCM f32 samples.
    /// * `temperature`: decoding temperature; `0.0` is greedy.
    ///
    /// # Returns
    /// The recognised segments in order. May be empty.
    fn recognize(&mut self, audio: &[f32], temperature: f32) -> Result<Vec<String>, VoxError>;
}

/// Synchronous text-to-speech model owned by a single worker thread.
pub trait SpeechEngine {
    /// Render `text` as one encoded audio payload (e.g. a WAV file).
    fn render(&mut self, text: &str) -> Result<Vec<u8>, VoxError>;
}

/// Convert PCM16 LE bytes to normalised f32 samples.
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn pcm16_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0)
        .collect()
}

// ── Transcriber ────────────────────────────────────────────────────

/// [`Transcriber`] backed by a pool of [`SpeechRecognizer`]s.
#[derive(Debug)]
pub struct BlockingTranscriber<R: SpeechRecognizer + 'static> {
    pool: EnginePool<R>,
}

impl<R: SpeechRecognizer + 'static> BlockingTranscriber<R> {
    /// Start `workers` recognizer threads built from `factory`.
    pub fn spawn(workers: usize, factory: EngineFactory<R>) -> Result<Self, VoxError> {
        Ok(Self {
            pool: EnginePool::spawn("voxstream-asr", workers, factory)?,
        })
    }
}

#[async_trait]
impl<R: SpeechRecognizer + 'static> Transcriber for BlockingTranscriber<R> {
    async fn transcribe(&self, pcm: &[u8], temperature: f32) -> Result<String, VoxError> {
        if pcm.is_empty() {
            return Ok(String::new());
        }

        let audio = pcm16_to_f32(pcm);
        let segments = self
            .pool
            .run(move |recognizer| recognizer.recognize(&audio, temperature))
            .await?;

        let text = merge_transcripts(&segments);
        tracing::debug!(segments = segments.len(), chars = text.len(), "Transcribed window");
        Ok(text)
    }
}

// ── Synthesizer ────────────────────────────────────────────────────

/// [`Synthesizer`] backed by a pool of [`SpeechEngine`]s.
///
/// Rendered audio is split into chunks of at most `chunk_bytes` bytes.
#[derive(Debug)]
pub struct BlockingSynthesizer<E: SpeechEngine + 'static> {
    pool: EnginePool<E>,
    chunk_bytes: usize,
}

impl<E: SpeechEngine + 'static> BlockingSynthesizer<E> {
    /// Start `workers` synthesis threads built from `factory`.
    pub fn spawn(
        workers: usize,
        chunk_bytes: usize,
        factory: EngineFactory<E>,
    ) -> Result<Self, VoxError> {
        if chunk_bytes == 0 {
            return Err(VoxError::InvalidSetting {
                key: "tts_chunk_bytes",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(Self {
            pool: EnginePool::spawn("voxstream-tts", workers, factory)?,
            chunk_bytes,
        })
    }
}

#[async_trait]
impl<E: SpeechEngine + 'static> Synthesizer for BlockingSynthesizer<E> {
    async fn synthesize(&self, text: &str) -> Result<Vec<Vec<u8>>, VoxError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let text = text.to_string();
        let audio = self.pool.run(move |engine| engine.render(&text)).await?;

        Ok(audio
            .chunks(self.chunk_bytes)
            .map(<[u8]>::to_vec)
            .collect())
    }
}
