//! # Structured Logging
//!
//! Subscriber setup and span helpers built on `tracing` / `tracing-subscriber`.
//!
//! `RUST_LOG` always wins over the configured level so operators can raise
//! verbosity for a single module without touching configuration.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};

/// Create a tracing span for one discovery stream.
///
/// ```rust,ignore
/// let span = xds_span!("ads", stream_id);
/// let span = xds_span!("rds", stream_id, peer = %addr);
/// ```
#[macro_export]
macro_rules! xds_span {
    ($service:expr, $stream_id:expr) => {
        tracing::info_span!(
            "xds_stream",
            service = %$service,
            stream_id = %$stream_id
        )
    };
    ($service:expr, $stream_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_stream",
            service = %$service,
            stream_id = %$stream_id,
            $($field)*
        )
    };
}

/// Create a debug span around one DAG rebuild.
#[macro_export]
macro_rules! rebuild_span {
    ($trigger:expr) => {
        tracing::debug_span!("dag_rebuild", trigger = %$trigger, rebuild_id = %uuid::Uuid::new_v4())
    };
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true).with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        xds_address = %config.xds.bind_address(),
        ingress_class = %config.translator.effective_ingress_class(),
        root_namespaces = ?config.translator.root_namespaces,
        http_port = config.listeners.http_port,
        https_port = config.listeners.https_port,
        metrics_enabled = %config.observability.enable_metrics,
        "routeplane control plane configuration"
    );
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_compile() {
        let _span = xds_span!("ads", "stream-1");
        let _span = xds_span!("rds", "stream-2", peer = "10.0.0.1:5000");
        let _span = rebuild_span!("ingress");
    }
}
