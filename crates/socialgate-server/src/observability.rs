//! Tracing setup for the `socialgate` binary.
//!
//! `RUST_LOG` wins over `logging.level` when it parses as a filter.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init_tracing(logging: &LoggingConfig) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = filter_for(&logging.level, rust_log.as_deref());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(logging.ansi))
        .try_init();
}

fn filter_for(level: &str, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_without_rust_log() {
        assert_eq!(filter_for("warn", None).to_string(), "warn");
    }

    #[test]
    fn test_rust_log_wins() {
        let filter = filter_for("warn", Some("socialgate_auth=debug"));
        assert_eq!(filter.to_string(), "socialgate_auth=debug");
    }
}
