//! Structured logging

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install the global JSON subscriber
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `service.log_level`; an unparsable level falls back to `info`.
/// Calling this twice leaves the first subscriber in place.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.service.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .try_init();

    match installed {
        Ok(()) => tracing::info!(
            service = %config.service.name,
            environment = %config.service.environment,
            "Tracing initialized"
        ),
        Err(e) => tracing::debug!("Tracing already initialized: {}", e),
    }
}
