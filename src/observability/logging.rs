//! # Structured Logging
//!
//! Subscriber setup for the binary and for tests that want log output.
//! Library code only emits `tracing` events with structured fields.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::{LogFormat, LoggingConfig};
use crate::core::error::{LbError, LbResult};

/// Build the filter: `RUST_LOG` wins, otherwise this crate at the configured level
pub fn env_filter(config: &LoggingConfig) -> LbResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(format!("indirect_agent_lb={},agent_lb={}", config.level, config.level))
            .map_err(|e| LbError::config(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Install the global tracing subscriber
///
/// Returns an error only for an invalid level; a subscriber that is already
/// installed (common in tests) is left in place.
pub fn init_logging(config: &LoggingConfig) -> LbResult<()> {
    let filter = env_filter(config)?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already initialized, skipping initialization");
    }

    Ok(())
}
