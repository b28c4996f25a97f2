//! # Routing DAG
//!
//! The in-memory graph of virtual hosts, routes and the clusters they point at.
//! A [`Dag`] is recomputed from scratch by [`builder::build`] on every relevant
//! object change and never patched in place.

pub mod annotations;
pub mod builder;
pub mod cluster_name;
pub mod store;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::objects::{HeaderCondition, HealthCheckSpec, ObjectKey};

pub use builder::{build, RouteSource};
pub use store::ObjectSet;

/// Name of the catch-all virtual host.
pub const WILDCARD_HOST: &str = "*";

/// Cookie used for session affinity hashing.
pub const SESSION_AFFINITY_COOKIE: &str = "X-Routeplane-Session-Affinity";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dag {
    /// Keyed (and therefore ordered) by fqdn
    pub virtual_hosts: BTreeMap<String, VirtualHost>,
    /// Every cluster referenced by a route, keyed by cluster name
    pub clusters: BTreeMap<String, Cluster>,
}

impl Dag {
    /// Virtual hosts with a usable certificate.
    pub fn secure_virtual_hosts(&self) -> impl Iterator<Item = &VirtualHost> {
        self.virtual_hosts.values().filter(|vh| vh.keypair().is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualHost {
    pub fqdn: String,
    /// Sorted by [`route_order`]
    pub routes: Vec<Route>,
    pub tls: Option<TlsBinding>,
}

/// A route as it is emitted into the insecure route table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsecureRoute<'a> {
    Forward(&'a Route),
    HttpsRedirect(&'a Route),
}

impl InsecureRoute<'_> {
    pub fn route(&self) -> &Route {
        match self {
            InsecureRoute::Forward(route) | InsecureRoute::HttpsRedirect(route) => route,
        }
    }
}

impl VirtualHost {
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self { fqdn: fqdn.into(), routes: Vec::new(), tls: None }
    }

    /// The bound certificate, if the binding exists and its secret is valid.
    pub fn keypair(&self) -> Option<&TlsKeypair> {
        if self.fqdn == WILDCARD_HOST {
            return None;
        }
        self.tls.as_ref().and_then(|binding| binding.keypair.as_ref())
    }

    /// Routes for plaintext traffic. With a valid certificate, routes that do
    /// not permit insecure traffic turn into HTTPS redirects.
    pub fn insecure_routes(&self) -> Vec<InsecureRoute<'_>> {
        let secure = self.keypair().is_some();
        self.routes
            .iter()
            .map(|route| {
                if secure && !route.permit_insecure {
                    InsecureRoute::HttpsRedirect(route)
                } else {
                    InsecureRoute::Forward(route)
                }
            })
            .collect()
    }

    /// Routes for TLS traffic; empty without a valid certificate.
    pub fn secure_routes(&self) -> &[Route] {
        if self.keypair().is_some() {
            &self.routes
        } else {
            &[]
        }
    }
}

/// Secret reference attached to a virtual host.
#[derive(Debug, Clone, PartialEq)]
pub struct TlsBinding {
    pub secret: ObjectKey,
    /// `None` while the secret is missing or invalid
    pub keypair: Option<TlsKeypair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsKeypair {
    pub certificate_chain: Vec<u8>,
    pub private_key: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    pub prefix: String,
    pub headers: Vec<HeaderCondition>,
    pub clusters: Vec<WeightedCluster>,
    pub timeout: Option<TimeoutPolicy>,
    pub retry: Option<RetryPolicy>,
    pub session_affinity: bool,
    pub websocket: bool,
    pub prefix_rewrite: Option<String>,
    pub permit_insecure: bool,
}

impl Route {
    /// Two routes with the same match key cannot coexist in one virtual host.
    pub fn same_match(&self, other: &Route) -> bool {
        self.prefix == other.prefix && self.headers == other.headers
    }
}

/// Most specific first: longer prefixes, then reverse lexical prefix, then
/// routes with more header conditions. Depends only on the match, so adding an
/// unrelated route never reorders existing ones.
pub fn route_order(a: &Route, b: &Route) -> Ordering {
    b.prefix
        .len()
        .cmp(&a.prefix.len())
        .then_with(|| b.prefix.cmp(&a.prefix))
        .then_with(|| b.headers.len().cmp(&a.headers.len()))
        .then_with(|| a.headers.cmp(&b.headers))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WeightedCluster {
    pub name: String,
    pub weight: u32,
}

/// A zero request timeout disables the proxy timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub request: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_on: String,
    pub num_retries: u32,
    pub per_try_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LbStrategy {
    RoundRobin,
    WeightedLeastRequest,
    Random,
    Cookie,
}

impl LbStrategy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "RoundRobin" => Some(Self::RoundRobin),
            "WeightedLeastRequest" => Some(Self::WeightedLeastRequest),
            "Random" => Some(Self::Random),
            "Cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "RoundRobin",
            Self::WeightedLeastRequest => "WeightedLeastRequest",
            Self::Random => "Random",
            Self::Cookie => "Cookie",
        }
    }
}

/// CA bundle and expected subject for TLS to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamValidation {
    pub ca_certificate: Vec<u8>,
    pub subject_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub service: ObjectKey,
    pub port: i32,
    pub port_name: String,
    pub strategy: Option<LbStrategy>,
    pub health_check: Option<HealthCheckSpec>,
    pub upstream_validation: Option<UpstreamValidation>,
}

impl Cluster {
    /// Name of the endpoint set backing this cluster.
    pub fn eds_service_name(&self) -> String {
        endpoint_service_name(&self.service, &self.port_name)
    }

    /// Stat-friendly name: `namespace_service_port`.
    pub fn alt_stat_name(&self) -> String {
        format!("{}_{}_{}", self.service.namespace, self.service.name, self.port)
    }
}

/// `namespace/service/portName`, or `namespace/service` for an unnamed port.
pub fn endpoint_service_name(service: &ObjectKey, port_name: &str) -> String {
    if port_name.is_empty() {
        service.to_string()
    } else {
        format!("{}/{}", service, port_name)
    }
}
