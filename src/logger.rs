//! Logging setup via tracing-subscriber.
//!
//! The effective filter comes from, in order: `-v` flags, `RUST_LOG`, the
//! `logging.level` config key. [`resolve_directive`] picks one without
//! touching global state; [`init`] installs it. Library code only emits
//! `tracing` events.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Used when `logging.level` is not a recognised level.
pub const FALLBACK_LEVEL: &str = "info";

/// Where the effective log directive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOrigin {
    Verbosity,
    RustLog,
    Config,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirective {
    pub directive: String,
    pub origin: LevelOrigin,
}

/// Choose the filter directive. A `RUST_LOG` value that `EnvFilter` rejects
/// is skipped, as is an unrecognised configured level.
pub fn resolve_directive(verbosity: u8, rust_log: Option<&str>, configured: &str) -> LogDirective {
    if let Some(level) = level_for_verbosity(verbosity) {
        return LogDirective { directive: level.to_string(), origin: LevelOrigin::Verbosity };
    }
    if let Some(raw) = rust_log.map(str::trim).filter(|r| !r.is_empty()) {
        if EnvFilter::try_new(raw).is_ok() {
            return LogDirective { directive: raw.to_string(), origin: LevelOrigin::RustLog };
        }
    }
    match parse_level(configured) {
        Ok(_) => LogDirective {
            directive: configured.trim().to_ascii_lowercase(),
            origin: LevelOrigin::Config,
        },
        Err(_) => LogDirective {
            directive: FALLBACK_LEVEL.to_string(),
            origin: LevelOrigin::Fallback,
        },
    }
}

/// Install the global subscriber, writing to stderr so stdout carries only
/// generated text. Fails if a subscriber is already set.
pub fn init(directive: &LogDirective) -> Result<(), AppError> {
    let filter = EnvFilter::try_new(&directive.directive)
        .map_err(|e| AppError::Logger(format!("invalid log directive '{}': {e}", directive.directive)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Parse a plain level name (`error` … `trace`, `off`).
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    let level = level.trim();
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

/// Map repeated `-v` flags to a level: one flag per tier above `warn`.
pub fn level_for_verbosity(verbosity: u8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    }
}
