//! Anthropic models hosted on AWS Bedrock (`InvokeModel`).
//!
//! The request envelope is Anthropic's Messages shape tagged with the Bedrock
//! version string; the reply's first text block is the result. The SDK
//! client is built with retries disabled so one call is one round trip.

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::Client;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::primitives::Blob;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::config::BedrockAnthropicSettings;
use crate::llm::{GenerateOptions, Generation, ProviderError};

/// Version tag Bedrock requires in every Anthropic request body.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

#[derive(Debug, Clone)]
pub struct BedrockAnthropicProvider {
    client: Client,
    settings: BedrockAnthropicSettings,
}

impl BedrockAnthropicProvider {
    /// Build a client from the default AWS credential chain, pinned to the
    /// configured region (and endpoint, when overridden).
    pub async fn new(settings: BedrockAnthropicSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .retry_config(RetryConfig::disabled());
        if let Some(url) = &settings.endpoint_url {
            loader = loader.endpoint_url(url.clone());
        }
        let sdk_config = loader.load().await;
        Self::with_client(Client::new(&sdk_config), settings)
    }

    /// Use an already configured SDK client.
    pub fn with_client(client: Client, settings: BedrockAnthropicSettings) -> Self {
        Self { client, settings }
    }

    pub fn model_id(&self) -> &str {
        &self.settings.model_id
    }

    /// Invoke the model once. Bedrock replies are not streamed: a streaming
    /// request still yields [`Generation::Text`].
    pub async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        // Anthropic accepts a narrower range than the shared option check
        if let Some(t) = options.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ProviderError::InvalidOptions(format!(
                    "temperature must be between 0 and 1 for Bedrock Anthropic, got {t}"
                )));
            }
        }
        let request = self.build_request(prompt, context, options);
        let body = serde_json::to_vec(&request)
            .map_err(|e| ProviderError::Request(format!("failed to encode request body: {e}")))?;

        debug!(
            model_id = %self.settings.model_id,
            max_tokens = request.max_tokens,
            temperature = request.temperature,
            prompt_len = prompt.len(),
            "invoking bedrock model"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&request)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full bedrock request payload");
        }

        let output = self
            .client
            .invoke_model()
            .model_id(&self.settings.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(wrap_sdk_error)?;

        let text = first_text_block(output.body().as_ref())?;
        debug!(text_len = text.len(), "received bedrock response");
        Ok(Generation::Text(text))
    }

    fn build_request<'a>(
        &self,
        prompt: &'a str,
        context: Option<&'a str>,
        options: &GenerateOptions,
    ) -> InvokeRequest<'a> {
        InvokeRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: options.max_tokens.unwrap_or(self.settings.max_tokens),
            temperature: options.temperature.unwrap_or(self.settings.temperature),
            top_p: options.top_p,
            system: context.filter(|c| !c.is_empty()),
            messages: vec![Message { role: "user", content: prompt }],
        }
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn first_text_block(body: &[u8]) -> Result<String, ProviderError> {
    let parsed: InvokeResponse = serde_json::from_slice(body).map_err(|e| {
        error!(error = %e, "failed to deserialize bedrock response");
        ProviderError::Request(format!("failed to parse response body: {e}"))
    })?;
    parsed
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .find_map(|block| block.text)
        .ok_or_else(|| ProviderError::Request("response contained no text block".into()))
}

/// Service errors keep their code and message; anything without a code
/// (transport, credentials, timeouts) becomes a generic request failure.
fn wrap_sdk_error<E, R>(err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let wrapped = match err.code() {
        Some(code) => ProviderError::Api {
            code: code.to_string(),
            message: err.message().unwrap_or("no message").to_string(),
        },
        None => ProviderError::Request(DisplayErrorContext(&err).to_string()),
    };
    error!(error = %wrapped, "bedrock invoke_model failed");
    wrapped
}
