//! # Configuration Management
//!
//! Loads [`AppConfig`] from `ROUTEPLANE_*` environment variables and validates it.

mod settings;

pub use settings::{
    AppConfig, ListenerConfig, ObservabilityConfig, TranslatorConfig, XdsConfig,
    DEFAULT_INGRESS_CLASS,
};

use validator::Validate;

use crate::{Error, Result};

/// Environment variable names read by [`AppConfig::from_env`]
pub mod env_keys {
    pub const XDS_HOST: &str = "ROUTEPLANE_XDS_HOST";
    pub const XDS_PORT: &str = "ROUTEPLANE_XDS_PORT";
    pub const STREAM_BUFFER: &str = "ROUTEPLANE_STREAM_BUFFER";
    pub const INGRESS_CLASS: &str = "ROUTEPLANE_INGRESS_CLASS";
    pub const ROOT_NAMESPACES: &str = "ROUTEPLANE_ROOT_NAMESPACES";
    pub const LISTENER_ADDRESS: &str = "ROUTEPLANE_LISTENER_ADDRESS";
    pub const HTTP_PORT: &str = "ROUTEPLANE_HTTP_PORT";
    pub const HTTPS_PORT: &str = "ROUTEPLANE_HTTPS_PORT";
    pub const LOG_LEVEL: &str = "ROUTEPLANE_LOG_LEVEL";
    pub const LOG_JSON: &str = "ROUTEPLANE_LOG_JSON";
    pub const METRICS_ENABLED: &str = "ROUTEPLANE_METRICS_ENABLED";
    pub const METRICS_PORT: &str = "ROUTEPLANE_METRICS_PORT";
}

impl AppConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();

        let config = AppConfig {
            xds: XdsConfig {
                host: env_or(env_keys::XDS_HOST, defaults.xds.host),
                port: parse_env(env_keys::XDS_PORT, defaults.xds.port)?,
                stream_buffer: parse_env(env_keys::STREAM_BUFFER, defaults.xds.stream_buffer)?,
            },
            translator: TranslatorConfig {
                ingress_class: std::env::var(env_keys::INGRESS_CLASS)
                    .ok()
                    .map(|class| class.trim().to_string())
                    .filter(|class| !class.is_empty()),
                root_namespaces: std::env::var(env_keys::ROOT_NAMESPACES)
                    .map(|raw| split_list(&raw))
                    .unwrap_or_default(),
            },
            listeners: ListenerConfig {
                address: env_or(env_keys::LISTENER_ADDRESS, defaults.listeners.address),
                http_port: parse_env(env_keys::HTTP_PORT, defaults.listeners.http_port)?,
                https_port: parse_env(env_keys::HTTPS_PORT, defaults.listeners.https_port)?,
            },
            observability: ObservabilityConfig {
                log_level: env_or(env_keys::LOG_LEVEL, defaults.observability.log_level),
                json_logging: parse_env(env_keys::LOG_JSON, defaults.observability.json_logging)?,
                enable_metrics: parse_env(
                    env_keys::METRICS_ENABLED,
                    defaults.observability.enable_metrics,
                )?,
                metrics_port: parse_env(
                    env_keys::METRICS_PORT,
                    defaults.observability.metrics_port,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.listeners.http_port == self.listeners.https_port {
            return Err(Error::config("HTTP and HTTPS listener ports cannot be the same"));
        }

        Ok(())
    }
}

/// Split a comma separated list, dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty()).unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid value for {}: {}", key, e))),
        _ => Ok(default),
    }
}
