//! # Observability Infrastructure
//!
//! Structured logging and metrics for the routeplane control plane.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::{init_metrics, metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize all observability components
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;
    init_metrics(config)?;

    info!(
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled = config.enable_metrics,
        "Observability initialized"
    );

    Ok(())
}
