//! Session settings and environment loading.
//!
//! Settings are plain data with defaults; [`Settings::from_env`] overlays
//! `STREAM_*` environment variables on top of those defaults. Values that do
//! not parse are ignored (with a warning) rather than failing startup.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VoxError;

/// Default capture sample rate (Hz).
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Chat model requested when none is configured.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Streaming session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sample rate the session expects inbound PCM at.
    pub sample_rate: u32,

    /// Minimum interval between two emitted partial transcripts.
    pub partial_interval_ms: u64,

    /// Continuous silence after speech that ends an utterance.
    pub vad_silence_ms: u32,

    /// Look-back window transcribed for partial results (seconds).
    pub partial_window_s: f64,

    /// Look-back window transcribed when finalizing (seconds).
    pub final_window_s: f64,

    /// Maximum audio retained by the ring buffer (seconds).
    pub buffer_max_s: f64,

    /// Capacity of the per-session log forwarding queue.
    pub log_queue_capacity: usize,

    /// Worker threads for blocking speech recognition.
    pub asr_workers: usize,

    /// Worker threads for blocking speech synthesis.
    pub tts_workers: usize,

    /// Size of each encoded audio chunk sent to the client.
    pub tts_chunk_bytes: usize,

    /// Sampling temperature passed to the transcriber.
    pub transcribe_temperature: f32,

    /// Base URL of an OpenAI-compatible chat API (e.g. `http://127.0.0.1:8080/v1`).
    pub openai_base_url: Option<String>,

    /// Chat model requested from the reply API.
    pub openai_model: String,

    /// Sampling temperature for reply generation.
    pub llm_temperature: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            partial_interval_ms: 180,
            vad_silence_ms: 350,
            partial_window_s: 6.0,
            final_window_s: 10.0,
            buffer_max_s: 30.0,
            log_queue_capacity: 200,
            asr_workers: 1,
            tts_workers: 2,
            tts_chunk_bytes: 32 * 1024,
            transcribe_temperature: 0.0,
            openai_base_url: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            llm_temperature: 0.7,
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings using `lookup` to resolve variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        overlay(&lookup, "STREAM_SAMPLE_RATE", &mut settings.sample_rate);
        overlay(
            &lookup,
            "STREAM_PARTIAL_INTERVAL_MS",
            &mut settings.partial_interval_ms,
        );
        overlay(&lookup, "STREAM_VAD_SILENCE_MS", &mut settings.vad_silence_ms);
        overlay(&lookup, "STREAM_PARTIAL_WINDOW_S", &mut settings.partial_window_s);
        overlay(&lookup, "STREAM_FINAL_WINDOW_S", &mut settings.final_window_s);
        overlay(&lookup, "STREAM_BUFFER_MAX_S", &mut settings.buffer_max_s);
        overlay(&lookup, "STREAM_LOG_QUEUE", &mut settings.log_queue_capacity);
        overlay(&lookup, "STREAM_ASR_WORKERS", &mut settings.asr_workers);
        overlay(&lookup, "STREAM_TTS_WORKERS", &mut settings.tts_workers);
        overlay(&lookup, "STREAM_OPENAI_MODEL", &mut settings.openai_model);
        overlay(&lookup, "STREAM_LLM_TEMPERATURE", &mut settings.llm_temperature);
        if let Some(url) = lookup("STREAM_OPENAI_BASE_URL") {
            let url = url.trim();
            settings.openai_base_url = (!url.is_empty()).then(|| url.to_string());
        }
        settings
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), VoxError> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be greater than zero"));
        }
        for (key, value) in [
            ("partial_window_s", self.partial_window_s),
            ("final_window_s", self.final_window_s),
            ("buffer_max_s", self.buffer_max_s),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(key, format!("must be a positive number of seconds, got {value}")));
            }
        }
        if self.log_queue_capacity == 0 {
            return Err(invalid("log_queue_capacity", "must be greater than zero"));
        }
        if self.asr_workers == 0 {
            return Err(invalid("asr_workers", "must be greater than zero"));
        }
        if self.tts_workers == 0 {
            return Err(invalid("tts_workers", "must be greater than zero"));
        }
        if self.tts_chunk_bytes == 0 {
            return Err(invalid("tts_chunk_bytes", "must be greater than zero"));
        }
        Ok(())
    }

    /// Debounce interval between partial transcripts.
    #[must_use]
    pub const fn partial_interval(&self) -> Duration {
        Duration::from_millis(self.partial_interval_ms)
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> VoxError {
    VoxError::InvalidSetting {
        key,
        reason: reason.into(),
    }
}

fn overlay<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparsable setting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.sample_rate, 16_000);
        assert_eq!(settings.partial_interval(), Duration::from_millis(180));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("STREAM_SAMPLE_RATE", "8000"),
            ("STREAM_VAD_SILENCE_MS", " 600 "),
            ("STREAM_FINAL_WINDOW_S", "4.5"),
        ]));
        assert_eq!(settings.sample_rate, 8_000);
        assert_eq!(settings.vad_silence_ms, 600);
        assert!((settings.final_window_s - 4.5).abs() < f64::EPSILON);
        assert_eq!(settings.partial_interval_ms, 180);
    }

    #[test]
    fn reply_api_settings_come_from_env() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("STREAM_OPENAI_BASE_URL", " http://127.0.0.1:8080/v1 "),
            ("STREAM_OPENAI_MODEL", "qwen2.5"),
            ("STREAM_LLM_TEMPERATURE", "0.2"),
            ("STREAM_ASR_WORKERS", "3"),
        ]));
        assert_eq!(
            settings.openai_base_url.as_deref(),
            Some("http://127.0.0.1:8080/v1")
        );
        assert_eq!(settings.openai_model, "qwen2.5");
        assert!((settings.llm_temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(settings.asr_workers, 3);

        let blank = Settings::from_lookup(lookup_from(&[("STREAM_OPENAI_BASE_URL", "  ")]));
        assert_eq!(blank.openai_base_url, None);
        assert_eq!(blank.openai_model, DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let settings = Settings::from_lookup(lookup_from(&[("STREAM_SAMPLE_RATE", "fast")]));
        assert_eq!(settings.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn validate_rejects_zero_rate_and_bad_windows() {
        let zero_rate = Settings {
            sample_rate: 0,
            ..Settings::default()
        };
        assert!(matches!(
            zero_rate.validate(),
            Err(VoxError::InvalidSetting { key: "sample_rate", .. })
        ));

        let bad_window = Settings {
            partial_window_s: -1.0,
            ..Settings::default()
        };
        assert!(matches!(
            bad_window.validate(),
            Err(VoxError::InvalidSetting { key: "partial_window_s", .. })
        ));
    }

    #[test]
    fn deserialises_partial_documents() {
        let settings: Settings = serde_json::from_str(r#"{"sample_rate": 24000}"#).unwrap();
        assert_eq!(settings.sample_rate, 24_000);
        assert_eq!(settings.log_queue_capacity, 200);
    }
}
