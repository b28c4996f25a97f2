//! gRPC bindings for ADS and the per-type discovery services.
//!
//! All five services are implemented by [`DiscoveryServer`] on top of the
//! shared stream loop. Only state-of-the-world streaming is served.

use std::pin::Pin;
use std::sync::Arc;

use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryService;
use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::AggregatedDiscoveryService, DeltaDiscoveryRequest,
    DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryService;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryService;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryService;
use futures::Stream;
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

use super::stream::{run_stream_loop, StreamScope};
use crate::xds::cache::ResourceCache;
use crate::xds::resources::ResourceType;

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send>>;
pub type DeltaResponseStream =
    Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send>>;

/// Serves every discovery service from one [`ResourceCache`].
#[derive(Debug, Clone)]
pub struct DiscoveryServer {
    cache: Arc<ResourceCache>,
    buffer: usize,
}

impl DiscoveryServer {
    pub fn new(cache: Arc<ResourceCache>, buffer: usize) -> Self {
        Self { cache, buffer }
    }

    fn open<S>(&self, requests: S, scope: StreamScope) -> Response<ResponseStream>
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + Unpin + 'static,
    {
        let stream = run_stream_loop(Arc::clone(&self.cache), requests, scope, self.buffer);
        Response::new(Box::pin(stream))
    }
}

fn delta_unimplemented(service: &str) -> Status {
    debug!(service, "Rejecting delta xDS stream");
    Status::unimplemented("delta xDS is not supported, use state-of-the-world streams")
}

fn fetch_unimplemented(service: &str) -> Status {
    debug!(service, "Rejecting unary fetch");
    Status::unimplemented("unary fetch is not supported, use a discovery stream")
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for DiscoveryServer {
    type StreamAggregatedResourcesStream = ResponseStream;
    type DeltaAggregatedResourcesStream = DeltaResponseStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        Ok(self.open(request.into_inner(), StreamScope::Aggregated))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(delta_unimplemented("ads"))
    }
}

macro_rules! per_type_service {
    (
        $service:ident, $resource_type:expr,
        $stream_ty:ident, $stream_fn:ident,
        $delta_ty:ident, $delta_fn:ident,
        $fetch_fn:ident
    ) => {
        #[tonic::async_trait]
        impl $service for DiscoveryServer {
            type $stream_ty = ResponseStream;
            type $delta_ty = DeltaResponseStream;

            async fn $stream_fn(
                &self,
                request: Request<Streaming<DiscoveryRequest>>,
            ) -> Result<Response<Self::$stream_ty>, Status> {
                Ok(self.open(request.into_inner(), StreamScope::Single($resource_type)))
            }

            async fn $delta_fn(
                &self,
                _request: Request<Streaming<DeltaDiscoveryRequest>>,
            ) -> Result<Response<Self::$delta_ty>, Status> {
                Err(delta_unimplemented($resource_type.short_name()))
            }

            async fn $fetch_fn(
                &self,
                _request: Request<DiscoveryRequest>,
            ) -> Result<Response<DiscoveryResponse>, Status> {
                Err(fetch_unimplemented($resource_type.short_name()))
            }
        }
    };
}

per_type_service!(
    ClusterDiscoveryService, ResourceType::Cluster,
    StreamClustersStream, stream_clusters,
    DeltaClustersStream, delta_clusters,
    fetch_clusters
);

per_type_service!(
    RouteDiscoveryService, ResourceType::Route,
    StreamRoutesStream, stream_routes,
    DeltaRoutesStream, delta_routes,
    fetch_routes
);

per_type_service!(
    ListenerDiscoveryService, ResourceType::Listener,
    StreamListenersStream, stream_listeners,
    DeltaListenersStream, delta_listeners,
    fetch_listeners
);

per_type_service!(
    EndpointDiscoveryService, ResourceType::Endpoint,
    StreamEndpointsStream, stream_endpoints,
    DeltaEndpointsStream, delta_endpoints,
    fetch_endpoints
);
