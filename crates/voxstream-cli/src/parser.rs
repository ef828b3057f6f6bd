//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use voxstream_core::Settings;

use crate::replay::ReplayOptions;

/// Replay raw PCM audio through a streaming voice session and print every
/// server event as a JSON line.
#[derive(Parser)]
#[command(name = "voxstream")]
#[command(about = "Replay PCM16 audio through a streaming voice session")]
#[command(version)]
pub struct Cli {
    /// Raw PCM16 little-endian mono audio file
    pub input: PathBuf,

    /// Text the stand-in recognizer reports for every audio window
    #[arg(long, default_value = "hello there")]
    pub say: String,

    /// Size of each replayed audio frame in milliseconds
    #[arg(long = "chunk-ms", default_value_t = 20)]
    pub chunk_ms: u32,

    /// Sleep between frames to mimic a live microphone
    #[arg(long)]
    pub realtime: bool,

    /// Energy VAD sensitivity (0.0-1.0); higher needs louder speech
    #[arg(long = "vad-sensitivity", default_value_t = 0.5)]
    pub vad_sensitivity: f32,

    /// Sample rate to declare in the start message (defaults to the session rate)
    #[arg(long = "declare-rate")]
    pub declare_rate: Option<u32>,

    /// Override STREAM_SAMPLE_RATE
    #[arg(long = "sample-rate")]
    pub sample_rate: Option<u32>,

    /// Override STREAM_PARTIAL_INTERVAL_MS
    #[arg(long = "partial-interval-ms")]
    pub partial_interval_ms: Option<u64>,

    /// Override STREAM_VAD_SILENCE_MS
    #[arg(long = "vad-silence-ms")]
    pub vad_silence_ms: Option<u32>,

    /// Skip speech synthesis; no `tts_chunk` events are sent
    #[arg(long)]
    pub mute: bool,

    /// API key for an OpenAI-compatible chat endpoint
    #[arg(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Override STREAM_OPENAI_BASE_URL
    #[arg(long = "openai-base-url")]
    pub openai_base_url: Option<String>,

    /// Override STREAM_OPENAI_MODEL
    #[arg(long = "openai-model")]
    pub openai_model: Option<String>,

    /// Override STREAM_ASR_WORKERS
    #[arg(long = "asr-workers")]
    pub asr_workers: Option<usize>,

    /// Override STREAM_TTS_WORKERS
    #[arg(long = "tts-workers")]
    pub tts_workers: Option<usize>,

    /// Also emit the session's forwarded log lines as `log` events
    #[arg(long = "forward-logs")]
    pub forward_logs: bool,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Apply command-line overrides on top of environment-derived settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(rate) = self.sample_rate {
            settings.sample_rate = rate;
        }
        if let Some(ms) = self.partial_interval_ms {
            settings.partial_interval_ms = ms;
        }
        if let Some(ms) = self.vad_silence_ms {
            settings.vad_silence_ms = ms;
        }
        if let Some(url) = &self.openai_base_url {
            settings.openai_base_url = Some(url.clone());
        }
        if let Some(model) = &self.openai_model {
            settings.openai_model = model.clone();
        }
        if let Some(workers) = self.asr_workers {
            settings.asr_workers = workers;
        }
        if let Some(workers) = self.tts_workers {
            settings.tts_workers = workers;
        }
    }

    #[must_use]
    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            say: self.say.clone(),
            chunk_ms: self.chunk_ms,
            realtime: self.realtime,
            vad_sensitivity: self.vad_sensitivity,
            declared_rate: self.declare_rate,
            mute: self.mute,
            openai_api_key: self.openai_api_key.clone(),
        }
    }
}
