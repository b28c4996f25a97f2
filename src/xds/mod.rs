//! Envoy xDS (eXtended Discovery Service) implementation
//!
//! Provides the gRPC server implementing Envoy's discovery protocols:
//! - ADS (Aggregated Discovery Service)
//! - CDS (Cluster Discovery Service)
//! - RDS (Route Discovery Service)
//! - LDS (Listener Discovery Service)
//! - EDS (Endpoint Discovery Service)
//!
//! along with the cache those streams read from and the event handler that
//! fills it.

pub mod cache;
pub mod resources;
pub mod services;
pub mod state;
pub mod translate;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryServiceServer;
use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryServiceServer;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryServiceServer;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryServiceServer;
use tonic::transport::Server;
use tracing::info;

use crate::config::XdsConfig;
use crate::{Error, Result};

pub use cache::{ResourceCache, ResourceSnapshot, Watcher};
pub use resources::{
    BuiltResource, ResourceType, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL,
    ROUTE_TYPE_URL,
};
pub use services::DiscoveryServer;
pub use state::EventHandler;

/// Serve ADS and the per-type discovery services until `shutdown` resolves.
pub async fn serve<F>(cache: Arc<ResourceCache>, config: &XdsConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid xDS address '{}': {}", config.bind_address(), e)))?;

    let discovery = DiscoveryServer::new(cache, config.stream_buffer);

    info!(%addr, "Starting xDS server");

    Server::builder()
        .add_service(AggregatedDiscoveryServiceServer::new(discovery.clone()))
        .add_service(ClusterDiscoveryServiceServer::new(discovery.clone()))
        .add_service(RouteDiscoveryServiceServer::new(discovery.clone()))
        .add_service(ListenerDiscoveryServiceServer::new(discovery.clone()))
        .add_service(EndpointDiscoveryServiceServer::new(discovery))
        .serve_with_shutdown(addr, shutdown)
        .await
        .map_err(|e| {
            if e.to_string().contains("Address already in use") {
                Error::transport(format!(
                    "xDS server failed to bind to {}: port {} is already in use",
                    addr,
                    addr.port()
                ))
            } else {
                Error::transport(format!("xDS server failed: {}", e))
            }
        })?;

    info!("xDS server stopped");
    Ok(())
}
