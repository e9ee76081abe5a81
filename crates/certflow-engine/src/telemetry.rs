//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

/// Environment variable holding the log filter. Falls back to `RUST_LOG`,
/// then to `info`.
pub const LOG_ENV: &str = "CERTFLOW_LOG";

/// The filter the subscriber is built with.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed, which
/// happens when an embedding application or another test set one up.
pub fn init_tracing(config: &EngineConfig) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    let installed = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
