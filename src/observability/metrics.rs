//! # Metrics Collection
//!
//! Prometheus metrics for rebuilds, the resource cache and discovery streams.
//! Recording goes through the `metrics` facade, so every call is a no-op until
//! [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use ::tracing::info;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Metrics recorder that tracks control plane metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a finished DAG rebuild
    pub fn record_rebuild(&self, trigger: &str, duration: f64, virtual_hosts: usize) {
        let labels = [("trigger", trigger.to_string())];
        counter!("routeplane_rebuilds_total", &labels).increment(1);
        histogram!("routeplane_rebuild_duration_seconds").record(duration);
        gauge!("routeplane_virtual_hosts").set(virtual_hosts as f64);
    }

    /// Record a new cache version for a resource type
    pub fn record_cache_version(&self, type_url: &str, version: u64, resources: usize) {
        let labels = [("type_url", type_url.to_string())];
        gauge!("routeplane_cache_version", &labels).set(version as f64);
        gauge!("routeplane_cache_resources", &labels).set(resources as f64);
    }

    /// Record an xDS stream opening or closing
    pub fn record_stream(&self, service: &str, connected: bool) {
        let labels = [("service", service.to_string())];
        if connected {
            gauge!("routeplane_xds_streams_active", &labels).increment(1.0);
        } else {
            gauge!("routeplane_xds_streams_active", &labels).decrement(1.0);
        }
    }

    /// Record a discovery response pushed to a client
    pub fn record_response(&self, type_url: &str) {
        let labels = [("type_url", type_url.to_string())];
        counter!("routeplane_xds_responses_total", &labels).increment(1);
    }

    /// Record a client rejection of a pushed version
    pub fn record_nack(&self, type_url: &str) {
        let labels = [("type_url", type_url.to_string())];
        counter!("routeplane_xds_nacks_total", &labels).increment(1);
    }

    fn describe(&self) {
        describe_counter!("routeplane_rebuilds_total", "DAG rebuilds by triggering object kind");
        describe_histogram!("routeplane_rebuild_duration_seconds", "DAG rebuild duration");
        describe_gauge!("routeplane_virtual_hosts", "Virtual hosts in the last build");
        describe_gauge!("routeplane_cache_version", "Current cache version per resource type");
        describe_gauge!("routeplane_cache_resources", "Resources in the current snapshot");
        describe_gauge!("routeplane_xds_streams_active", "Open discovery streams");
        describe_counter!("routeplane_xds_responses_total", "Discovery responses sent");
        describe_counter!("routeplane_xds_nacks_total", "Discovery responses rejected by clients");
    }
}

static METRICS: Lazy<MetricsRecorder> = Lazy::new(MetricsRecorder::new);

/// Get the global metrics recorder
pub fn metrics() -> &'static MetricsRecorder {
    &METRICS
}

/// Initialize metrics collection and Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let socket_addr: SocketAddr = format!("0.0.0.0:{}", config.metrics_port)
        .parse()
        .map_err(|e| Error::config(format!("Invalid metrics port: {}", e)))?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", "routeplane")
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    metrics().describe();

    info!(metrics_addr = %socket_addr, "Metrics collection initialized");
    Ok(())
}
