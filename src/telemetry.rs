//! Tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable that switches output to JSON lines.
pub const JSON_ENV: &str = "MULTILEND_LOG_JSON";

/// Initialise the `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured filter. Returns `false` when a
/// global subscriber was already installed, which is the normal case in
/// test binaries that call this more than once.
pub fn init_logging(cfg: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter));

    let json_logging = cfg.json || std::env::var(JSON_ENV).is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .try_init()
            .is_ok()
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .is_ok()
    }
}
