//! xDS Streaming Protocol Implementation
//!
//! The shared state-of-the-world stream loop behind ADS and the per-type
//! discovery services.
//!
//! # Protocol Flow
//!
//! 1. **Initial Request**: the first request for a type registers a cache
//!    watcher and is answered right away with the current snapshot, filtered
//!    by `resource_names`.
//! 2. **ACK/NACK**: a request carrying the last nonce is an ACK, or a NACK when
//!    `error_detail` is set. Neither triggers a response. A NACK is logged and
//!    counted; the client keeps its last good config until the next version.
//! 3. **Resubscription**: a changed `resource_names` set is answered with the
//!    current snapshot under the new filter.
//! 4. **Push Updates**: a watcher wakeup re-reads the snapshot and pushes it
//!    when its version is newer than the last one sent for that type.
//!
//! # Concurrency
//!
//! Each stream is one task that handles requests and notifications in order,
//! so per-stream bookkeeping needs no locking. Responses leave through a
//! bounded channel; a slow client only fills its own buffer while its cache
//! notifications coalesce.

use std::collections::HashMap;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt, StreamMap};
use tonic::Status;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::observability::metrics;
use crate::xds::cache::{ResourceCache, Watcher};
use crate::xds::resources::ResourceType;
use crate::Error;

/// Which resource types a stream may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamScope {
    /// ADS: every type, keyed by `type_url`
    Aggregated,
    /// A per-type service
    Single(ResourceType),
}

impl StreamScope {
    pub fn label(&self) -> &'static str {
        match self {
            StreamScope::Aggregated => "ads",
            StreamScope::Single(ty) => ty.short_name(),
        }
    }

    /// Resolve the type a request is about. `Ok(None)` means the request is
    /// ignored.
    fn resolve(&self, type_url: &str) -> Result<Option<ResourceType>, Status> {
        match self {
            StreamScope::Aggregated => {
                let resolved = ResourceType::from_type_url(type_url);
                if resolved.is_none() {
                    warn!(type_url = %type_url, "Ignoring request for unknown resource type");
                }
                Ok(resolved)
            }
            StreamScope::Single(ty) if type_url.is_empty() || type_url == ty.type_url() => Ok(Some(*ty)),
            StreamScope::Single(ty) => Err(Status::invalid_argument(format!(
                "{} stream cannot serve type {}, expected {}",
                self.label(),
                type_url,
                ty.type_url()
            ))),
        }
    }
}

/// Per-type bookkeeping for one stream.
#[derive(Debug, Default)]
struct Subscription {
    /// Sorted, deduplicated; empty means everything
    names: Vec<String>,
    last_sent: u64,
    last_nonce: String,
    acked: Option<u64>,
}

struct DiscoveryStream {
    cache: Arc<ResourceCache>,
    scope: StreamScope,
    tx: mpsc::Sender<Result<DiscoveryResponse, Status>>,
    subscriptions: HashMap<ResourceType, Subscription>,
    watchers: StreamMap<ResourceType, Watcher>,
}

/// Why a stream stopped.
enum Closed {
    /// Client went away or finished
    Client,
    /// Terminate the stream with this status
    Failed(Status),
}

impl DiscoveryStream {
    async fn run<S>(&mut self, mut requests: S) -> Closed
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Unpin,
    {
        loop {
            tokio::select! {
                request = requests.next() => match request {
                    Some(Ok(request)) => {
                        if let Err(closed) = self.handle_request(request).await {
                            return closed;
                        }
                    }
                    Some(Err(status)) => {
                        debug!(error = %status, "Request stream failed");
                        return Closed::Client;
                    }
                    None => return Closed::Client,
                },
                Some((resource_type, version)) = self.watchers.next(), if !self.watchers.is_empty() => {
                    debug!(%resource_type, version, "Cache notification");
                    if let Err(closed) = self.respond(resource_type, false).await {
                        return closed;
                    }
                },
                _ = self.tx.closed() => return Closed::Client,
            }
        }
    }

    async fn handle_request(&mut self, request: DiscoveryRequest) -> Result<(), Closed> {
        let resource_type = match self.scope.resolve(&request.type_url) {
            Ok(Some(resource_type)) => resource_type,
            Ok(None) => return Ok(()),
            Err(status) => return Err(Closed::Failed(status)),
        };

        let span = tracing::debug_span!(
            "xds_discovery_request",
            %resource_type,
            version_info = %request.version_info,
            nonce = %request.response_nonce,
        );
        if span.in_scope(|| self.track_request(resource_type, request)) {
            self.respond(resource_type, true).instrument(span).await
        } else {
            Ok(())
        }
    }

    /// Update subscription state for a request. Returns true when the request
    /// has to be answered with the current snapshot.
    fn track_request(&mut self, resource_type: ResourceType, request: DiscoveryRequest) -> bool {
        let mut names = request.resource_names;
        names.sort();
        names.dedup();

        let Some(subscription) = self.subscriptions.get_mut(&resource_type) else {
            debug!(
                node_id = ?request.node.as_ref().map(|n| &n.id),
                resources = names.len(),
                "New subscription"
            );
            self.watchers.insert(resource_type, self.cache.watch(resource_type));
            self.subscriptions.insert(resource_type, Subscription { names, ..Default::default() });
            return true;
        };

        if let Some(detail) = &request.error_detail {
            if request.response_nonce == subscription.last_nonce {
                warn!(
                    type_url = %resource_type.type_url(),
                    rejected_version = subscription.last_sent,
                    code = detail.code,
                    message = %detail.message,
                    "[NACK] Client rejected configuration"
                );
                metrics().record_nack(resource_type.type_url());
            } else {
                debug!("NACK for a stale nonce");
            }
        }

        if subscription.names != names {
            debug!(resources = names.len(), "Resource names changed");
            subscription.names = names;
            return true;
        }

        if request.response_nonce.is_empty() {
            // A repeated initial request, e.g. after the client lost its state.
            return true;
        }

        if request.response_nonce != subscription.last_nonce {
            debug!(expected = %subscription.last_nonce, "Ignoring request with stale nonce");
            return false;
        }

        if request.error_detail.is_none() {
            subscription.acked = Some(subscription.last_sent);
            debug!(version = subscription.last_sent, "[ACK] Client accepted configuration");
        }
        false
    }

    /// Send the current snapshot for `resource_type`. Without `force` nothing
    /// is sent unless the snapshot is newer than the last response.
    async fn respond(&mut self, resource_type: ResourceType, force: bool) -> Result<(), Closed> {
        let snapshot = self.cache.get(resource_type);
        let Some(subscription) = self.subscriptions.get_mut(&resource_type) else {
            return Ok(());
        };

        let version = snapshot.version();
        if version < subscription.last_sent {
            let err = Error::invariant(format!(
                "{} snapshot version {} is older than version {} already sent",
                resource_type, version, subscription.last_sent
            ));
            error!(error = %err, "Refusing to send an older snapshot");
            return Err(Closed::Failed(err.into()));
        }
        if version == subscription.last_sent && !force {
            debug!(%resource_type, version, "Snapshot unchanged since last response");
            return Ok(());
        }

        let response = DiscoveryResponse {
            version_info: snapshot.version_info(),
            resources: snapshot.filtered(&subscription.names),
            type_url: resource_type.type_url().to_string(),
            nonce: snapshot.version_info(),
            ..Default::default()
        };
        subscription.last_sent = version;
        subscription.last_nonce = response.nonce.clone();

        debug!(
            %resource_type,
            version,
            resources = response.resources.len(),
            "Sending discovery response"
        );

        self.tx.send(Ok(response)).await.map_err(|_| Closed::Client)?;
        metrics().record_response(resource_type.type_url());
        Ok(())
    }
}

/// Run the shared SOTW stream loop for one client stream.
///
/// Spawns a task that owns the stream's state and returns the response side
/// for tonic. Every watcher the stream registered is dropped with the task.
pub fn run_stream_loop<S>(
    cache: Arc<ResourceCache>,
    requests: S,
    scope: StreamScope,
    buffer: usize,
) -> ReceiverStream<Result<DiscoveryResponse, Status>>
where
    S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let stream_id = Uuid::new_v4();
    let span = crate::xds_span!(scope.label(), stream_id);

    tokio::spawn(
        async move {
            info!("Discovery stream opened");
            metrics().record_stream(scope.label(), true);

            let mut stream = DiscoveryStream {
                cache,
                scope,
                tx,
                subscriptions: HashMap::new(),
                watchers: StreamMap::new(),
            };

            match stream.run(requests).await {
                Closed::Client => info!("Discovery stream closed"),
                Closed::Failed(status) => {
                    warn!(code = ?status.code(), message = %status.message(), "Terminating discovery stream");
                    let _ = stream.tx.send(Err(status)).await;
                }
            }

            let acked: Vec<String> = stream
                .subscriptions
                .iter()
                .filter_map(|(ty, sub)| sub.acked.map(|version| format!("{}={}", ty, version)))
                .collect();
            debug!(acked = ?acked, "Dropping stream watchers");
            metrics().record_stream(scope.label(), false);
        }
        .instrument(span),
    );

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_scope_defaults_and_rejects() {
        let scope = StreamScope::Single(ResourceType::Cluster);
        assert_eq!(scope.resolve("").unwrap(), Some(ResourceType::Cluster));
        assert_eq!(scope.resolve(ResourceType::Cluster.type_url()).unwrap(), Some(ResourceType::Cluster));

        let err = scope.resolve(ResourceType::Route.type_url()).unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn aggregated_scope_ignores_unknown_types() {
        let scope = StreamScope::Aggregated;
        assert_eq!(scope.resolve(ResourceType::Endpoint.type_url()).unwrap(), Some(ResourceType::Endpoint));
        assert_eq!(scope.resolve("type.googleapis.com/envoy.config.core.v3.Secret").unwrap(), None);
        assert_eq!(scope.label(), "ads");
        assert_eq!(StreamScope::Single(ResourceType::Route).label(), "rds");
    }
}
