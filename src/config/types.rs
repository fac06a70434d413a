//! Typed, validated views over the configuration tree.
//!
//! Providers read these once at construction; per-call options override them.

use crate::error::AppError;

use super::tree::ConfigStore;

/// Settings for the Bedrock-hosted Anthropic backend.
/// Populated from `aws.region` and `aws.bedrock.*`.
#[derive(Debug, Clone, PartialEq)]
pub struct BedrockAnthropicSettings {
    pub region: String,
    /// Bedrock model identifier, e.g. `anthropic.claude-3-sonnet-20240229-v1:0`.
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Optional endpoint override (`aws.bedrock.endpoint_url`), for
    /// VPC endpoints and local stand-ins.
    pub endpoint_url: Option<String>,
}

impl BedrockAnthropicSettings {
    pub fn from_store(store: &ConfigStore) -> Result<Self, AppError> {
        let region = non_empty(store, "aws.region")?;
        let model_id = non_empty(store, "aws.bedrock.anthropic.model_id")?;

        let max_tokens = store
            .get("aws.bedrock.anthropic.max_tokens")
            .and_then(|v| v.as_u64())
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                AppError::Config("aws.bedrock.anthropic.max_tokens must be a positive integer".into())
            })?;

        let temperature = store
            .get("aws.bedrock.anthropic.temperature")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                AppError::Config("aws.bedrock.anthropic.temperature must be a number".into())
            })?;
        check_temperature("aws.bedrock.anthropic.temperature", temperature, 1.0)?;

        let endpoint_url = store.get_or::<Option<String>>("aws.bedrock.endpoint_url", None);

        Ok(Self {
            region,
            model_id,
            max_tokens,
            temperature: temperature as f32,
            endpoint_url,
        })
    }
}

/// OpenAI / OpenAI-compatible chat-completion settings.
/// Populated from `openai.*`; the API key comes from `OPENAI_API_KEY` only.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiSettings {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Sent only when configured or requested per call.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// `None` for keyless local servers. Never sourced from config files.
    pub api_key: Option<String>,
}

impl OpenAiSettings {
    pub fn from_store(store: &ConfigStore, api_key: Option<String>) -> Result<Self, AppError> {
        let api_base_url = non_empty(store, "openai.api_base_url")?;
        let model = non_empty(store, "openai.model")?;

        let timeout_seconds = store
            .get("openai.timeout_seconds")
            .and_then(|v| v.as_u64())
            .filter(|n| *n > 0)
            .ok_or_else(|| AppError::Config("openai.timeout_seconds must be a positive integer".into()))?;

        let temperature = match store.get("openai.temperature").filter(|v| !v.is_null()) {
            Some(v) => {
                let t = v
                    .as_f64()
                    .ok_or_else(|| AppError::Config("openai.temperature must be a number".into()))?;
                check_temperature("openai.temperature", t, 2.0)?;
                Some(t as f32)
            }
            None => None,
        };

        let max_tokens = match store.get("openai.max_tokens").filter(|v| !v.is_null()) {
            Some(v) => Some(
                v.as_u64()
                    .filter(|n| *n > 0)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        AppError::Config("openai.max_tokens must be a positive integer".into())
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            api_base_url,
            model,
            timeout_seconds,
            temperature,
            max_tokens,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

fn non_empty(store: &ConfigStore, path: &str) -> Result<String, AppError> {
    store
        .get(path)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Config(format!("{path} must be a non-empty string")))
}

fn check_temperature(path: &str, value: f64, max: f64) -> Result<(), AppError> {
    if (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!("{path} must be between 0 and {max}, got {value}")))
    }
}
