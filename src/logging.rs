//! Logging setup. Everything goes to stderr so command output stays pipeable.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable holding an `EnvFilter` directive. Takes precedence over the config file.
pub const LOG_ENV: &str = "TRACKDASH_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Pick the filter directive: environment first, then config, then `warn`.
pub fn filter_directive(env_value: Option<String>, config: &LoggingConfig) -> String {
    env_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| config.level.clone().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

/// Install the global subscriber. `force_json` comes from the `--log-json` flag.
pub fn init(config: &LoggingConfig, force_json: bool) {
    let directive = filter_directive(std::env::var(LOG_ENV).ok(), config);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let registry = tracing_subscriber::registry().with(filter);
    // A second init (e.g. from tests) leaves the first subscriber in place.
    let _ = if force_json || config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
