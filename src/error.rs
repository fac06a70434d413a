//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    /// An enumerated environment override held a value that does not parse.
    /// Fatal: configuration loading stops here.
    #[error("config error: invalid value {value:?} in {var}: {reason}")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },

    /// `set` tried to descend through a segment that holds a non-mapping value.
    #[error("config error: cannot set '{path}': '{segment}' is not a mapping")]
    PathConflict { path: String, segment: String },

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Provider(#[from] crate::llm::ProviderError),
}
