//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Covers OpenAI, Azure-hosted deployments exposing the same shape, and
//! OpenAI-compatible local servers. All wire types are private to this
//! module; callers only see [`Generation`].
//!
//! Streaming requests set `stream: true` and read the server-sent-events body
//! incrementally; each non-empty `delta.content` becomes one fragment.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::config::OpenAiSettings;
use crate::llm::{GenerateOptions, Generation, ProviderError, TextStream};

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Constructed once, then cheaply cloned because `reqwest::Client` is an
/// `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    settings: OpenAiSettings,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from resolved settings.
    ///
    /// When `settings.api_key` is present it is sent as
    /// `Authorization: Bearer <key>` on every request. The timeout covers the
    /// whole exchange, including a streamed body.
    pub fn new(settings: OpenAiSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Send `prompt` as the user message, with `context` as the system
    /// message when given. One round trip; no retries.
    pub async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let payload = self.build_request(prompt, context, options);

        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            max_tokens = ?payload.max_tokens,
            stream = payload.stream,
            prompt_len = prompt.len(),
            "sending chat completion request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full chat completion request payload");
        }

        let mut req = self.client.post(&self.settings.api_base_url).json(&payload);
        if let Some(key) = &self.settings.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.settings.api_base_url, error = %e, "chat completion request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        let response = check_status(response).await?;

        if payload.stream {
            return Ok(Generation::Stream(sse_fragments(response.bytes_stream())));
        }

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize chat completion response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received chat completion response");

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ProviderError::Request("missing content in response".into()))?;

        Ok(Generation::Text(text))
    }

    fn build_request(
        &self,
        prompt: &str,
        context: Option<&str>,
        options: &GenerateOptions,
    ) -> ChatCompletionRequest {
        let model = self.settings.model.clone();

        // Some models (gpt-5 family) do not accept a temperature parameter.
        let temperature = if model.starts_with("gpt-5") {
            None
        } else {
            options.temperature.or(self.settings.temperature)
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = context.filter(|c| !c.is_empty()) {
            messages.push(Message { role: "system".to_string(), content: sys.to_string() });
        }
        messages.push(Message { role: "user".to_string(), content: prompt.to_string() });

        ChatCompletionRequest {
            model,
            messages,
            temperature,
            max_tokens: options.max_tokens.or(self.settings.max_tokens),
            top_p: options.top_p,
            stream: options.stream,
        }
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One `data:` payload of a streamed completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ErrorBody {
    /// Provider code when present, else the error type, else `fallback`.
    fn into_api_error(self, fallback: String) -> ProviderError {
        let code = match self.code {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => self.kind.unwrap_or(fallback),
            Some(other) => other.to_string(),
        };
        ProviderError::Api { code, message: self.message }
    }
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let err = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => env.error.into_api_error(status.as_u16().to_string()),
        Err(_) => ProviderError::Request(format!("HTTP {status}: {body}")),
    };

    error!(%status, error = %err, "chat completion request returned HTTP error");
    Err(err)
}

// ── Server-sent events ────────────────────────────────────────────────────────

/// Line-buffered SSE decoder state. Only complete lines are decoded, so a
/// UTF-8 sequence split across network chunks is never cut.
struct SseState<S> {
    body: S,
    line: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> SseState<S> {
    fn feed(&mut self, chunk: &[u8]) -> Result<(), ProviderError> {
        self.line.extend_from_slice(chunk);
        while let Some(pos) = self.line.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.line.drain(..=pos).collect();
            self.handle_line(&line)?;
            if self.finished {
                break;
            }
        }
        Ok(())
    }

    fn handle_line(&mut self, raw: &[u8]) -> Result<(), ProviderError> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        // `event:`, `id:` and `:` comment lines carry nothing we use.
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim_start();
        if data.is_empty() {
            return Ok(());
        }
        if data == "[DONE]" {
            self.finished = true;
            return Ok(());
        }

        let chunk: ChatCompletionChunk = serde_json::from_str(data)
            .map_err(|e| ProviderError::Request(format!("malformed stream chunk: {e}")))?;
        if let Some(err) = chunk.error {
            return Err(err.into_api_error("stream_error".to_string()));
        }
        if let Some(content) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
        {
            self.pending.push_back(content);
        }
        Ok(())
    }
}

/// Turn an SSE byte stream into text fragments. The stream ends at `[DONE]`
/// or when the body ends; the first error is yielded and ends the stream.
fn sse_fragments<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        line: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.pending.pop_front() {
                return Some((Ok(fragment), st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = st.feed(chunk.as_ref()) {
                        st.finished = true;
                        st.pending.clear();
                        return Some((Err(e), st));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(ProviderError::Request(format!("stream interrupted: {e}"))), st));
                }
                None => {
                    // A final line without a trailing newline still counts.
                    let rest = std::mem::take(&mut st.line);
                    st.finished = true;
                    if let Err(e) = st.handle_line(&rest) {
                        return Some((Err(e), st));
                    }
                }
            }
        }
    })
    .boxed()
}
