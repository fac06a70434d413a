//! LLM provider implementations.
//!
//! `build(backend, config)` is the factory, called by the router.
//! Adding a new backend = new module + new match arm.

pub mod bedrock_anthropic;
pub mod dummy;
pub mod openai_compatible;

use std::env;

use tracing::debug;

use crate::config::{BedrockAnthropicSettings, ConfigStore, OpenAiSettings};
use crate::llm::{Backend, LlmProvider, ProviderError};

/// Environment variable holding the chat-completion API key. Never read from
/// config files.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Construct the provider for `backend`, reading its settings from `config`.
pub async fn build(backend: Backend, config: &ConfigStore) -> Result<LlmProvider, ProviderError> {
    match backend {
        Backend::Dummy => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        Backend::OpenAiCompatible => {
            let settings = OpenAiSettings::from_store(config, env::var(OPENAI_API_KEY_ENV).ok())?;
            debug!(model = %settings.model, url = %settings.api_base_url, "building chat completion provider");
            let p = openai_compatible::OpenAiCompatibleProvider::new(settings)?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        Backend::BedrockAnthropic => {
            let settings = BedrockAnthropicSettings::from_store(config)?;
            debug!(model_id = %settings.model_id, region = %settings.region, "building bedrock provider");
            let p = bedrock_anthropic::BedrockAnthropicProvider::new(settings).await;
            Ok(LlmProvider::BedrockAnthropic(p))
        }
    }
}
