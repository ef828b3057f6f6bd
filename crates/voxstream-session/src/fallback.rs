//! Stand-in collaborators for running without models.
//!
//! [`FixedRecognizer`] hears the same words in every window that contains
//! sound, [`EchoReplyGenerator`] replays the user's last turn word by word
//! and [`ToneEngine`] beeps once per word. The recognizer and the tone engine
//! are blocking engines and run on the worker pools like real models do.
//! [`SilentSynthesizer`] produces no audio at all.

use std::f32::consts::TAU;
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;

use voxstream_core::{ChatTurn, ReplyGenerator, Synthesizer, TokenStream, VoxError};

use crate::engines::{SpeechEngine, SpeechRecognizer};

/// Delay between echoed tokens.
pub const ECHO_TOKEN_DELAY: Duration = Duration::from_millis(20);

const EMPTY_HISTORY_REPLY: &str = "I'm thinking ...";

/// Recognizer that reports fixed text for any window containing sound.
///
/// Windows at or below `min_rms` energy yield no segments, the way a real
/// recognizer treats silence.
#[derive(Debug, Clone)]
pub struct FixedRecognizer {
    text: String,
    min_rms: f32,
}

impl FixedRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            min_rms: 0.0,
        }
    }

    #[must_use]
    pub fn with_min_rms(mut self, min_rms: f32) -> Self {
        self.min_rms = min_rms;
        self
    }
}

impl SpeechRecognizer for FixedRecognizer {
    fn recognize(&mut self, audio: &[f32], _temperature: f32) -> Result<Vec<String>, VoxError> {
        if rms(audio) <= self.min_rms {
            return Ok(Vec::new());
        }
        Ok(vec![self.text.clone()])
    }
}

fn rms(audio: &[f32]) -> f32 {
    if audio.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = audio.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
    (sum_squares / audio.len() as f64).sqrt() as f32
}

// ── Tone engine ────────────────────────────────────────────────────

const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.2;
const BEEP_MS: u64 = 120;
const GAP_MS: u64 = 60;

/// Speech engine that renders one short beep per word as a mono PCM16 WAV.
#[derive(Debug, Clone, Copy)]
pub struct ToneEngine {
    sample_rate: u32,
}

impl ToneEngine {
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn samples_for(&self, ms: u64) -> u64 {
        u64::from(self.sample_rate) * ms / 1000
    }
}

impl SpeechEngine for ToneEngine {
    fn render(&mut self, text: &str) -> Result<Vec<u8>, VoxError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;

        let rate = self.sample_rate as f32;
        for _ in text.split_whitespace() {
            for n in 0..self.samples_for(BEEP_MS) {
                let phase = TAU * TONE_HZ * (n as f32 / rate);
                let sample = phase.sin() * TONE_AMPLITUDE * f32::from(i16::MAX);
                writer.write_sample(sample as i16).map_err(wav_error)?;
            }
            for _ in 0..self.samples_for(GAP_MS) {
                writer.write_sample(0_i16).map_err(wav_error)?;
            }
        }
        writer.finalize().map_err(wav_error)?;

        Ok(cursor.into_inner())
    }
}

fn wav_error(e: hound::Error) -> VoxError {
    VoxError::Synthesis(format!("WAV encoding failed: {e}"))
}

// ── Replies and silence ────────────────────────────────────────────

/// Streams the words of the most recent turn back as reply tokens.
#[derive(Debug, Clone)]
pub struct EchoReplyGenerator {
    delay: Duration,
}

impl EchoReplyGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_delay(ECHO_TOKEN_DELAY)
    }

    #[must_use]
    pub const fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoReplyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplyGenerator for EchoReplyGenerator {
    async fn stream_reply(&self, history: Vec<ChatTurn>) -> Result<TokenStream, VoxError> {
        let source = history
            .last()
            .map(|turn| turn.content.trim())
            .filter(|text| !text.is_empty())
            .unwrap_or(EMPTY_HISTORY_REPLY);

        let words: Vec<String> = source.split_whitespace().map(|w| format!("{w} ")).collect();
        let delay = self.delay;

        Ok(stream::iter(words)
            .then(move |word| async move {
                tokio::time::sleep(delay).await;
                Ok(word)
            })
            .boxed())
    }
}

/// Synthesizer that never produces audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSynthesizer;

#[async_trait]
impl Synthesizer for SilentSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Vec<Vec<u8>>, VoxError> {
        Ok(Vec::new())
    }
}
