//! Dummy LLM provider: echoes the prompt back prefixed with `[echo]`.
//! Used for smoke runs and tests without an API key or network access.

use crate::llm::{GenerateOptions, Generation, ProviderError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn generate(
        &self,
        prompt: &str,
        _context: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let text = format!("[echo] {prompt}");
        if options.stream {
            Ok(Generation::Stream(Generation::Text(text).into_stream()))
        } else {
            Ok(Generation::Text(text))
        }
    }
}
