//! CDS: one EDS-backed cluster per distinct cluster name.

use std::time::Duration;

use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType, EdsClusterConfig, LbPolicy,
};
use envoy_types::pb::envoy::config::cluster::v3::Cluster as EnvoyCluster;
use envoy_types::pb::envoy::config::core::v3::{
    config_source::ConfigSourceSpecifier,
    health_check::{HealthChecker, HttpHealthCheck},
    transport_socket::ConfigType as TransportSocketConfigType,
    AggregatedConfigSource, ApiVersion, ConfigSource, HealthCheck, TransportSocket,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    common_tls_context::ValidationContextType, subject_alt_name_matcher::SanType,
    CertificateValidationContext, CommonTlsContext, SubjectAltNameMatcher, UpstreamTlsContext,
};
use envoy_types::pb::envoy::r#type::matcher::v3::{string_matcher::MatchPattern, StringMatcher};
use envoy_types::pb::google::protobuf::UInt32Value;

use super::{inline_bytes, proto_duration, typed_any};
use crate::dag::{Cluster, Dag, LbStrategy, UpstreamValidation};
use crate::objects::HealthCheckSpec;
use crate::xds::resources::{BuiltResource, ResourceType};

pub const UPSTREAM_TLS_CONTEXT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext";
pub const TLS_TRANSPORT_SOCKET: &str = "envoy.transport_sockets.tls";

const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

pub fn clusters(dag: &Dag) -> Vec<BuiltResource> {
    dag.clusters
        .values()
        .map(|cluster| BuiltResource::encode(cluster.name.clone(), ResourceType::Cluster, &envoy_cluster(cluster)))
        .collect()
}

fn envoy_cluster(cluster: &Cluster) -> EnvoyCluster {
    EnvoyCluster {
        name: cluster.name.clone(),
        alt_stat_name: cluster.alt_stat_name(),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: Some(EdsClusterConfig {
            eds_config: Some(ads_config_source()),
            service_name: cluster.eds_service_name(),
        }),
        connect_timeout: Some(proto_duration(CONNECT_TIMEOUT)),
        lb_policy: lb_policy(cluster.strategy) as i32,
        health_checks: cluster.health_check.as_ref().map(health_check).into_iter().collect(),
        transport_socket: cluster.upstream_validation.as_ref().map(upstream_tls),
        ..Default::default()
    }
}

pub(crate) fn ads_config_source() -> ConfigSource {
    ConfigSource {
        config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource::default())),
        resource_api_version: ApiVersion::V3 as i32,
        ..Default::default()
    }
}

fn lb_policy(strategy: Option<LbStrategy>) -> LbPolicy {
    match strategy {
        None | Some(LbStrategy::RoundRobin) => LbPolicy::RoundRobin,
        Some(LbStrategy::WeightedLeastRequest) => LbPolicy::LeastRequest,
        Some(LbStrategy::Random) => LbPolicy::Random,
        Some(LbStrategy::Cookie) => LbPolicy::RingHash,
    }
}

fn health_check(spec: &HealthCheckSpec) -> HealthCheck {
    let seconds = |value: u32| proto_duration(Duration::from_secs(u64::from(value)));

    HealthCheck {
        timeout: Some(seconds(spec.effective_timeout_seconds())),
        interval: Some(seconds(spec.effective_interval_seconds())),
        unhealthy_threshold: Some(UInt32Value { value: spec.effective_unhealthy_threshold() }),
        healthy_threshold: Some(UInt32Value { value: spec.effective_healthy_threshold() }),
        health_checker: Some(HealthChecker::HttpHealthCheck(HttpHealthCheck {
            host: spec.host.clone().unwrap_or_default(),
            path: spec.path.clone(),
            ..Default::default()
        })),
        ..Default::default()
    }
}

fn upstream_tls(validation: &UpstreamValidation) -> TransportSocket {
    let validation_context = CertificateValidationContext {
        trusted_ca: Some(inline_bytes(&validation.ca_certificate)),
        match_typed_subject_alt_names: vec![SubjectAltNameMatcher {
            san_type: SanType::Dns as i32,
            matcher: Some(StringMatcher {
                match_pattern: Some(MatchPattern::Exact(validation.subject_name.clone())),
                ignore_case: false,
            }),
            ..Default::default()
        }],
        ..Default::default()
    };

    let context = UpstreamTlsContext {
        common_tls_context: Some(CommonTlsContext {
            validation_context_type: Some(ValidationContextType::ValidationContext(validation_context)),
            ..Default::default()
        }),
        sni: validation.subject_name.clone(),
        ..Default::default()
    };

    TransportSocket {
        name: TLS_TRANSPORT_SOCKET.to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(typed_any(
            UPSTREAM_TLS_CONTEXT_TYPE_URL,
            &context,
        ))),
    }
}
