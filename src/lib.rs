//! llm-knife: one call shape over several text-generation backends.
//!
//! Build a [`config::ConfigStore`] once, hand it to a [`llm::ModelRouter`],
//! and resolve backend names to [`llm::LlmProvider`]s.

pub mod config;
pub mod error;
pub mod llm;
pub mod logger;

pub use config::ConfigStore;
pub use error::AppError;
pub use llm::{Backend, GenerateOptions, Generation, LlmProvider, ModelRouter, ProviderError};
