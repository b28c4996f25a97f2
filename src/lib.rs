//! # Routeplane
//!
//! An Envoy control plane that turns ingress-style routing objects into xDS
//! configuration and keeps connected proxies in sync as those objects change.
//!
//! ## Architecture
//!
//! ```text
//! object events → EventHandler → DAG rebuild → translate → ResourceCache → discovery streams → Envoy
//! ```
//!
//! ## Core Components
//!
//! - **Objects**: typed `Ingress`, `HostRoute`, `Service`, `Secret` and `Endpoints`
//! - **DAG**: virtual hosts, routes and content-addressed clusters, rebuilt from scratch
//! - **xDS**: the versioned resource cache and the ADS/CDS/RDS/LDS/EDS streams
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use routeplane::config::AppConfig;
//! use routeplane::xds::{serve, EventHandler, ResourceCache};
//!
//! #[tokio::main]
//! async fn main() -> routeplane::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let cache = Arc::new(ResourceCache::new());
//!     let _handler = EventHandler::from_config(Arc::clone(&cache), &config);
//!     serve(cache, &config.xds, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod objects;
pub mod observability;
pub mod xds;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "routeplane");
    }
}
