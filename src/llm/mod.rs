//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend,
//! plus a registry entry in [`router`].
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! `generate` is an `async fn` on the enum so callers need no trait-object
//! machinery.

pub mod providers;
pub mod router;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use thiserror::Error;

use crate::error::AppError;

pub use router::{Backend, ModelRouter};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    /// No registered backend matches the requested name.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid generation options: {0}")]
    InvalidOptions(String),
    #[error("provider config error: {0}")]
    Config(String),
    /// The provider answered with a coded error (auth, throttling, validation…).
    #[error("provider API error ({code}): {message}")]
    Api { code: String, message: String },
    #[error("provider request failed: {0}")]
    Request(String),
}

impl From<AppError> for ProviderError {
    fn from(e: AppError) -> Self {
        ProviderError::Config(e.to_string())
    }
}

// ── Request / result types ────────────────────────────────────────────────────

/// Per-call generation options. Unset fields fall back to the provider's
/// configured settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Ask for incremental fragments. Providers without streaming support
    /// return the whole reply as [`Generation::Text`].
    pub stream: bool,
}

impl GenerateOptions {
    pub fn streaming() -> Self {
        Self { stream: true, ..Self::default() }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.max_tokens == Some(0) {
            return Err(ProviderError::InvalidOptions("max_tokens must be positive".into()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ProviderError::InvalidOptions(format!(
                    "temperature must be between 0 and 2, got {t}"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(ProviderError::InvalidOptions(format!(
                    "top_p must be between 0 and 1, got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// Forward-only stream of text fragments; ends when the provider stream ends.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// What a `generate` call produced.
pub enum Generation {
    Text(String),
    Stream(TextStream),
}

impl Generation {
    /// Drain into one string, concatenating stream fragments in order.
    pub async fn into_text(self) -> Result<String, ProviderError> {
        match self {
            Generation::Text(text) => Ok(text),
            Generation::Stream(mut fragments) => {
                let mut out = String::new();
                while let Some(fragment) = fragments.next().await {
                    out.push_str(&fragment?);
                }
                Ok(out)
            }
        }
    }

    /// View either form as a stream; a completed text becomes one fragment.
    pub fn into_stream(self) -> TextStream {
        match self {
            Generation::Text(text) => stream::iter([Ok(text)]).boxed(),
            Generation::Stream(fragments) => fragments,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Generation::Stream(_))
    }
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Generation::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Generation::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Adding a backend = new module + new variant + new `generate` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    BedrockAnthropic(providers::bedrock_anthropic::BedrockAnthropicProvider),
}

impl LlmProvider {
    /// Send `prompt` (with optional system `context`) and return the reply,
    /// or a fragment stream when `options.stream` is set and supported.
    pub async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        options.validate()?;
        match self {
            LlmProvider::Dummy(p) => p.generate(prompt, context, options).await,
            LlmProvider::OpenAiCompatible(p) => p.generate(prompt, context, options).await,
            LlmProvider::BedrockAnthropic(p) => p.generate(prompt, context, options).await,
        }
    }

    /// Alias for [`LlmProvider::generate`], for conversational call sites.
    pub async fn ask(
        &self,
        prompt: &str,
        context: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        self.generate(prompt, context, options).await
    }

    /// One-shot completion with default options.
    pub async fn complete(&self, prompt: &str, context: Option<&str>) -> Result<String, ProviderError> {
        self.generate(prompt, context, &GenerateOptions::default())
            .await?
            .into_text()
            .await
    }

    pub fn backend(&self) -> Backend {
        match self {
            LlmProvider::Dummy(_) => Backend::Dummy,
            LlmProvider::OpenAiCompatible(_) => Backend::OpenAiCompatible,
            LlmProvider::BedrockAnthropic(_) => Backend::BedrockAnthropic,
        }
    }

    /// Model identifier captured at construction.
    pub fn model(&self) -> &str {
        match self {
            LlmProvider::Dummy(_) => "echo",
            LlmProvider::OpenAiCompatible(p) => p.model(),
            LlmProvider::BedrockAnthropic(p) => p.model_id(),
        }
    }
}
