use gf_core::config::{GeneralConfig, LogFormat};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging with human-readable output format.
///
/// Uses the `RUST_LOG` environment variable if set, otherwise falls back
/// to `default_level` (e.g. "info", "debug", "gf_agents=debug,warn").
///
/// Safe to call multiple times (e.g. in tests); later calls are no-ops.
pub fn init_logging(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised (human-readable)");
}

/// Initialize logging with one JSON object per line.
///
/// Same filter rules and idempotence as [`init_logging`].
pub fn init_logging_json(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised (json)");
}

/// Initialize logging from the `[general]` config section.
pub fn init_from_config(service_name: &str, config: &GeneralConfig) {
    match config.log_format {
        LogFormat::Human => init_logging(service_name, &config.log_level),
        LogFormat::Json => init_logging_json(service_name, &config.log_level),
    }
}
