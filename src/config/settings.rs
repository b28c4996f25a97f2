//! # Configuration Settings
//!
//! Defines the configuration structure for the routeplane control plane.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Ingress class used when none is configured.
pub const DEFAULT_INGRESS_CLASS: &str = "routeplane";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// xDS server configuration
    #[validate(nested)]
    pub xds: XdsConfig,

    /// Object translation configuration
    #[validate(nested)]
    pub translator: TranslatorConfig,

    /// Proxy listener configuration
    #[validate(nested)]
    pub listeners: ListenerConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// xDS gRPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct XdsConfig {
    /// Bind address
    #[validate(length(min = 1, message = "xDS host cannot be empty"))]
    pub host: String,

    /// Bind port
    #[validate(range(min = 1, message = "xDS port must be between 1 and 65535"))]
    pub port: u16,

    /// Per-stream response buffer
    #[validate(range(min = 1, max = 1024, message = "Stream buffer must be between 1 and 1024"))]
    pub stream_buffer: usize,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 18000, stream_buffer: 16 }
    }
}

impl XdsConfig {
    /// Socket address string for the gRPC listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Controls which routing objects take part in a build.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TranslatorConfig {
    /// Accepted ingress class; `None` accepts the default class and unannotated objects.
    pub ingress_class: Option<String>,

    /// Namespaces allowed to hold `HostRoute` roots; empty means unrestricted.
    pub root_namespaces: Vec<String>,
}

impl TranslatorConfig {
    /// The class an annotated object has to carry to be accepted
    pub fn effective_ingress_class(&self) -> &str {
        self.ingress_class.as_deref().unwrap_or(DEFAULT_INGRESS_CLASS)
    }

    /// True when a class other than the default has been configured
    pub fn has_custom_ingress_class(&self) -> bool {
        self.ingress_class.as_deref().is_some_and(|class| class != DEFAULT_INGRESS_CLASS)
    }

    /// Whether a `HostRoute` root may live in `namespace`
    pub fn is_root_namespace(&self, namespace: &str) -> bool {
        self.root_namespaces.is_empty() || self.root_namespaces.iter().any(|ns| ns == namespace)
    }
}

/// Addresses of the listeners handed to the proxies
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListenerConfig {
    #[validate(length(min = 1, message = "Listener address cannot be empty"))]
    pub address: String,

    #[validate(range(min = 1, message = "HTTP port must be between 1 and 65535"))]
    pub http_port: u16,

    #[validate(range(min = 1, message = "HTTPS port must be between 1 and 65535"))]
    pub https_port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { address: "0.0.0.0".to_string(), http_port: 8080, https_port: 8443 }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit JSON formatted logs
    pub json_logging: bool,

    /// Serve Prometheus metrics
    pub enable_metrics: bool,

    #[validate(range(min = 1, message = "Metrics port must be between 1 and 65535"))]
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: false,
            metrics_port: 9090,
        }
    }
}
