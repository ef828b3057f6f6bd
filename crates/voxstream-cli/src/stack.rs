//! Session collaborators chosen from settings and command-line flags.

use std::sync::Arc;

use voxstream_core::{ReplyGenerator, Settings, Synthesizer, Transcriber};
use voxstream_session::{
    BlockingSynthesizer, BlockingTranscriber, DEFAULT_OPENAI_BASE_URL, EchoReplyGenerator,
    EngineFactory, FixedRecognizer, OpenAiConfig, OpenAiReplyGenerator, SilentSynthesizer,
    ToneEngine,
};

use crate::replay::ReplayOptions;

/// Where replies come from.
#[derive(Debug, Clone)]
pub enum ReplyBackend {
    /// Echo the user's words back; used when no chat API is configured.
    Echo,
    OpenAi(OpenAiConfig),
}

impl ReplyBackend {
    /// Use the chat API when an API key or a base URL is configured.
    #[must_use]
    pub fn select(settings: &Settings, api_key: Option<&str>) -> Self {
        let api_key = api_key.map(str::trim).filter(|key| !key.is_empty());
        if api_key.is_none() && settings.openai_base_url.is_none() {
            return Self::Echo;
        }

        Self::OpenAi(OpenAiConfig {
            base_url: settings
                .openai_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key: api_key.map(str::to_string),
            model: settings.openai_model.clone(),
            temperature: settings.llm_temperature,
        })
    }

    #[must_use]
    pub fn into_generator(self) -> Arc<dyn ReplyGenerator> {
        match self {
            Self::Echo => {
                tracing::warn!(
                    "Neither OPENAI_API_KEY nor STREAM_OPENAI_BASE_URL is set. Falling back to echo replies."
                );
                Arc::new(EchoReplyGenerator::new())
            }
            Self::OpenAi(config) => {
                tracing::info!(
                    base_url = %config.base_url,
                    model = %config.model,
                    "Streaming replies from chat API"
                );
                Arc::new(OpenAiReplyGenerator::new(config))
            }
        }
    }
}

/// The collaborators one replayed session is built from.
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub replies: Arc<dyn ReplyGenerator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// Start the recognizer and synthesis pools and pick the reply backend.
///
/// Windows at or below `min_rms` energy transcribe to nothing.
pub fn build(
    settings: &Settings,
    options: &ReplayOptions,
    min_rms: f32,
) -> anyhow::Result<Collaborators> {
    let recognizer = FixedRecognizer::new(options.say.as_str()).with_min_rms(min_rms);
    let recognizers: EngineFactory<FixedRecognizer> = Arc::new(move || Ok(recognizer.clone()));
    let transcriber = BlockingTranscriber::spawn(settings.asr_workers, recognizers)?;

    let synthesizer: Arc<dyn Synthesizer> = if options.mute {
        Arc::new(SilentSynthesizer)
    } else {
        let sample_rate = settings.sample_rate;
        let voices: EngineFactory<ToneEngine> = Arc::new(move || Ok(ToneEngine::new(sample_rate)));
        Arc::new(BlockingSynthesizer::spawn(
            settings.tts_workers,
            settings.tts_chunk_bytes,
            voices,
        )?)
    };

    let replies =
        ReplyBackend::select(settings, options.openai_api_key.as_deref()).into_generator();

    Ok(Collaborators {
        transcriber: Arc::new(transcriber),
        replies,
        synthesizer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_without_key_or_base_url() {
        let settings = Settings::default();
        assert!(matches!(ReplyBackend::select(&settings, None), ReplyBackend::Echo));
        assert!(matches!(
            ReplyBackend::select(&settings, Some("  ")),
            ReplyBackend::Echo
        ));
    }

    #[test]
    fn api_key_alone_targets_openai() {
        let settings = Settings::default();
        let ReplyBackend::OpenAi(config) = ReplyBackend::select(&settings, Some("sk-test")) else {
            panic!("expected the chat API backend");
        };
        assert_eq!(config.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, settings.openai_model);
    }

    #[test]
    fn base_url_alone_targets_a_local_server() {
        let settings = Settings {
            openai_base_url: Some("http://127.0.0.1:8080/v1".into()),
            openai_model: "local".into(),
            ..Settings::default()
        };
        let ReplyBackend::OpenAi(config) = ReplyBackend::select(&settings, None) else {
            panic!("expected the chat API backend");
        };
        assert_eq!(config.base_url, "http://127.0.0.1:8080/v1");
        assert_eq!(config.api_key, None);
        assert_eq!(config.model, "local");
    }
}
