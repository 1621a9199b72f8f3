//! Logging setup using `tracing-subscriber`, with progress spinners from
//! `tracing-indicatif` for running tasks.
//!
//! Priority for determining the log level:
//! 1. `TSUMIKI_LOG` environment variable, as an `EnvFilter` directive
//! 2. the level passed in, usually from `--log-level`

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable that overrides the log filter.
pub const LOG_ENV: &str = "TSUMIKI_LOG";

/// Installs the global subscriber. Call once at startup.
pub fn init(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let indicatif = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(indicatif.get_stderr_writer()),
        )
        .with(indicatif)
        .init();
}

/// Parses a level name as accepted by `--log-level`.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" Warning "), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }
}
