//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the config is loaded.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Env var that overrides the configured filter. Falls back to `RUST_LOG`.
pub const LOG_ENV: &str = "VOLAIR_LOG";

/// Initialise the global tracing subscriber.
///
/// Filter precedence: `VOLAIR_LOG`, then `RUST_LOG`, then `level`.
pub fn init(level: &str) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Validate a level string before handing it to [`init`].
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_levels_parse() {
        for l in &["off", "error", "warn", "info", "debug", "trace"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
    }

    #[test]
    fn invalid_level_errors() {
        assert!(parse_level("loud").is_err());
        assert!(parse_level("").is_err());
    }

    #[test]
    fn init_succeeds_or_already_init() {
        // Another test in this process may have installed the subscriber first.
        match init("info") {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
