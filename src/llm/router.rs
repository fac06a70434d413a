//! Backend-name routing.
//!
//! A name such as `"OpenAI-Turbo"` is lower-cased and matched by prefix
//! against an explicit registry. The longest matching prefix wins, so entry
//! order never matters. The registry is checked for completeness when the
//! router is built: every [`Backend`] needs at least one prefix.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::config::ConfigStore;
use crate::llm::{LlmProvider, ProviderError, providers};

/// Provider families the crate can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// OpenAI / Azure-style `/v1/chat/completions`.
    OpenAiCompatible,
    /// Anthropic models through AWS Bedrock `InvokeModel`.
    BedrockAnthropic,
    /// Keyless echo backend.
    Dummy,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::OpenAiCompatible, Backend::BedrockAnthropic, Backend::Dummy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::OpenAiCompatible => "openai-compatible",
            Backend::BedrockAnthropic => "bedrock-anthropic",
            Backend::Dummy => "dummy",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in prefix table.
pub const DEFAULT_REGISTRY: &[(&str, Backend)] = &[
    ("openai", Backend::OpenAiCompatible),
    ("azure", Backend::OpenAiCompatible),
    ("anthropic", Backend::BedrockAnthropic),
    ("bedrock", Backend::BedrockAnthropic),
    ("dummy", Backend::Dummy),
];

/// Reject registries with empty, upper-case or duplicated prefixes, or with a
/// backend that no prefix reaches.
pub fn check_registry(registry: &[(String, Backend)]) -> Result<(), ProviderError> {
    let mut seen = HashSet::new();
    for (prefix, backend) in registry {
        if prefix.is_empty() {
            return Err(ProviderError::Config(format!("empty prefix registered for {backend}")));
        }
        if prefix.to_lowercase() != *prefix {
            return Err(ProviderError::Config(format!("prefix '{prefix}' must be lower-case")));
        }
        if !seen.insert(prefix.as_str()) {
            return Err(ProviderError::Config(format!("prefix '{prefix}' registered twice")));
        }
    }
    for backend in Backend::ALL {
        if !registry.iter().any(|(_, b)| *b == backend) {
            return Err(ProviderError::Config(format!("no prefix registered for {backend}")));
        }
    }
    Ok(())
}

/// Resolves backend names to providers built from a borrowed config.
#[derive(Debug, Clone)]
pub struct ModelRouter<'a> {
    config: &'a ConfigStore,
    registry: Vec<(String, Backend)>,
}

impl<'a> ModelRouter<'a> {
    /// Router over [`DEFAULT_REGISTRY`].
    pub fn new(config: &'a ConfigStore) -> Result<Self, ProviderError> {
        let registry = DEFAULT_REGISTRY
            .iter()
            .map(|(prefix, backend)| (prefix.to_string(), *backend))
            .collect();
        Self::with_registry(config, registry)
    }

    pub fn with_registry(
        config: &'a ConfigStore,
        registry: Vec<(String, Backend)>,
    ) -> Result<Self, ProviderError> {
        check_registry(&registry)?;
        Ok(Self { config, registry })
    }

    /// Which backend `name` selects, without constructing it.
    pub fn backend_for(&self, name: &str) -> Result<Backend, ProviderError> {
        let lowered = name.to_lowercase();
        self.registry
            .iter()
            .filter(|(prefix, _)| lowered.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, backend)| *backend)
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    /// Build the provider `name` selects.
    pub async fn resolve(&self, name: &str) -> Result<LlmProvider, ProviderError> {
        let backend = self.backend_for(name)?;
        debug!(name, %backend, "resolved backend");
        providers::build(backend, self.config).await
    }
}
