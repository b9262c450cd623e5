//! Logging initialization.
//!
//! Uses the `tracing` ecosystem for structured logging, with a
//! human-readable formatter by default and JSON for log shippers. Output goes
//! to stderr; stdout is reserved for command output (`url`, `gen-config`).

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber.
///
/// `verbose` selects DEBUG instead of INFO. `RUST_LOG`, when set, wins over
/// both. Calling this twice is harmless: the second install is ignored.
pub fn init(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}
