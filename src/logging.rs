//! Structured logging setup.
//!
//! Logs go to stderr so that the interactive shell keeps stdout to itself.

use anyhow::{anyhow, Result};
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_ansi(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}
