//! OpenAI-compatible streaming reply client.
//!
//! Posts the conversation to `{base_url}/chat/completions` with
//! `"stream": true` and turns the Server-Sent Events response into reply
//! tokens. Works against OpenAI itself and against local servers speaking
//! the same protocol (llama-server, vLLM, Ollama's `/v1`).
//!
//! SSE format: `data: {"choices":[{"delta":{"content":"hi"}}]}\n\n`, ended
//! by `data: [DONE]`.

use std::fmt::Display;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use voxstream_core::{ChatTurn, ReplyGenerator, TokenStream, VoxError};

/// Base URL used when only an API key is configured.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Where and how to request replies.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// [`ReplyGenerator`] streaming from an OpenAI-compatible chat API.
#[derive(Debug, Clone)]
pub struct OpenAiReplyGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiReplyGenerator {
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyGenerator {
    async fn stream_reply(&self, history: Vec<ChatTurn>) -> Result<TokenStream, VoxError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": history,
            "temperature": self.config.temperature,
            "stream": true,
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoxError::Reply(format!("Failed to reach {}: {e}", self.endpoint())))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoxError::Reply(format!(
                "Chat API returned {status}: {error_text}"
            )));
        }

        tracing::debug!(model = %self.config.model, turns = history.len(), "Streaming reply");
        Ok(sse_tokens(response.bytes_stream()))
    }
}

/// One parsed SSE line.
#[derive(Debug, PartialEq)]
enum SseLine {
    Token(String),
    Done,
    Error(String),
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments and `event:` / `id:` fields.
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(chunk) = serde_json::from_str::<Value>(data) else {
        tracing::debug!(data, "Skipping unparsable SSE data");
        return SseLine::Skip;
    };
    if let Some(error) = chunk.get("error") {
        let message = error["message"].as_str().map_or_else(|| error.to_string(), str::to_string);
        return SseLine::Error(message);
    }

    match chunk["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => SseLine::Token(content.to_string()),
        _ => SseLine::Skip,
    }
}

/// State threaded through the `unfold` stream.
struct SseState {
    stream: BoxStream<'static, Result<Bytes, String>>,
    buf: BytesMut,
    upstream_ended: bool,
    done: bool,
}

/// Turn a chat-completions SSE byte stream into reply tokens.
///
/// The stream ends at `[DONE]` or when the body ends. Transport errors and
/// error payloads end it with one `Err` item.
fn sse_tokens<S, E>(byte_stream: S) -> TokenStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    let state = SseState {
        stream: byte_stream.map(|chunk| chunk.map_err(|e| e.to_string())).boxed(),
        buf: BytesMut::new(),
        upstream_ended: false,
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            if let Some(line_end) = st.buf.iter().position(|b| *b == b'\n') {
                let line = st.buf.split_to(line_end + 1);
                match parse_sse_line(String::from_utf8_lossy(&line).trim()) {
                    SseLine::Token(token) => return Some((Ok(token), st)),
                    SseLine::Done => return None,
                    SseLine::Error(message) => {
                        st.done = true;
                        return Some((Err(VoxError::Reply(message)), st));
                    }
                    SseLine::Skip => continue,
                }
            }

            if st.upstream_ended {
                return None;
            }
            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Reply stream broke");
                    st.done = true;
                    return Some((Err(VoxError::Reply(format!("Reply stream broke: {e}"))), st));
                }
                None => {
                    // A final line without a trailing newline still counts.
                    st.upstream_ended = true;
                    if !st.buf.is_empty() {
                        st.buf.extend_from_slice(b"\n");
                    }
                }
            }
        }
    })
    .boxed()
}
