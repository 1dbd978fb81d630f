use std::process::ExitCode;

use eventdesk_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so stdout carries only command payloads.
fn init_logging(config: Option<&AppConfig>) {
    let (level, format) = match config {
        Some(config) => (config.logging.level.as_str(), config.logging.format),
        None => ("warn", LogFormat::Compact),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    // Commands report config errors themselves; logging falls back to warn-level compact output.
    let config = AppConfig::load(LoadOptions::default()).ok();
    init_logging(config.as_ref());

    eventdesk_cli::run()
}
