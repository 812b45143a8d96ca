// Logging module - tracing subscriber setup
use crate::domain::error::{BridgeError, BridgeResult};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log verbosity requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

/// Filter directive for the crate at `level`, other crates at warn.
pub fn filter_directive(level: &str, verbosity: Verbosity) -> String {
    let level = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => level,
        Verbosity::Verbose => "debug",
    };
    format!("serbridge={},warn", level)
}

/// Initialize logging system
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(level: &str, verbosity: Verbosity) -> BridgeResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(level, verbosity)))
        .map_err(|e| BridgeError::config(format!("Invalid log level '{}': {}", level, e)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(verbosity == Verbosity::Verbose)
                .with_file(verbosity == Verbosity::Verbose)
                .with_line_number(verbosity == Verbosity::Verbose),
        )
        .try_init()
        .map_err(|e| BridgeError::config(format!("Logging already initialized: {}", e)))?;

    tracing::debug!("serbridge logging initialized");
    Ok(())
}
