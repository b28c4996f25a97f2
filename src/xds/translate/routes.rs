//! RDS: the `ingress_http` and `ingress_https` route tables.

use envoy_types::pb::envoy::config::route::v3::{
    header_matcher::HeaderMatchSpecifier,
    redirect_action::SchemeRewriteSpecifier,
    route::Action,
    route_action::{hash_policy, ClusterSpecifier, HashPolicy, UpgradeConfig},
    route_match::PathSpecifier,
    weighted_cluster::ClusterWeight,
    HeaderMatcher, RedirectAction, RetryPolicy as EnvoyRetryPolicy, Route as EnvoyRoute,
    RouteAction, RouteConfiguration, RouteMatch, VirtualHost as EnvoyVirtualHost, WeightedCluster,
};
use envoy_types::pb::envoy::r#type::matcher::v3::{string_matcher::MatchPattern, StringMatcher};
use envoy_types::pb::google::protobuf::UInt32Value;

use super::{proto_duration, HTTPS_NAME, HTTP_NAME};
use crate::dag::{Dag, InsecureRoute, Route, VirtualHost, WILDCARD_HOST, SESSION_AFFINITY_COOKIE};
use crate::objects::HeaderCondition;
use crate::xds::resources::{BuiltResource, ResourceType};

/// Both route tables, always present, virtual hosts sorted by name.
pub fn route_configurations(dag: &Dag) -> Vec<BuiltResource> {
    let mut insecure = Vec::new();
    let mut secure = Vec::new();

    for vhost in dag.virtual_hosts.values() {
        let routes: Vec<EnvoyRoute> = vhost.insecure_routes().into_iter().map(insecure_route).collect();
        if !routes.is_empty() {
            insecure.push(virtual_host(vhost, routes));
        }

        let routes: Vec<EnvoyRoute> = vhost.secure_routes().iter().map(forward_route).collect();
        if !routes.is_empty() {
            secure.push(virtual_host(vhost, routes));
        }
    }

    vec![route_configuration(HTTP_NAME, insecure), route_configuration(HTTPS_NAME, secure)]
}

fn route_configuration(name: &str, virtual_hosts: Vec<EnvoyVirtualHost>) -> BuiltResource {
    let config =
        RouteConfiguration { name: name.to_string(), virtual_hosts, ..Default::default() };
    BuiltResource::encode(name, ResourceType::Route, &config)
}

fn virtual_host(vhost: &VirtualHost, routes: Vec<EnvoyRoute>) -> EnvoyVirtualHost {
    EnvoyVirtualHost {
        name: vhost.fqdn.clone(),
        domains: domains(&vhost.fqdn),
        routes,
        ..Default::default()
    }
}

/// `[fqdn, fqdn:*]` so requests with an explicit port still match.
fn domains(fqdn: &str) -> Vec<String> {
    if fqdn == WILDCARD_HOST {
        vec![WILDCARD_HOST.to_string()]
    } else {
        vec![fqdn.to_string(), format!("{}:*", fqdn)]
    }
}

fn insecure_route(route: InsecureRoute<'_>) -> EnvoyRoute {
    match route {
        InsecureRoute::Forward(route) => forward_route(route),
        InsecureRoute::HttpsRedirect(route) => EnvoyRoute {
            r#match: Some(route_match(route)),
            action: Some(Action::Redirect(RedirectAction {
                scheme_rewrite_specifier: Some(SchemeRewriteSpecifier::HttpsRedirect(true)),
                ..Default::default()
            })),
            ..Default::default()
        },
    }
}

fn forward_route(route: &Route) -> EnvoyRoute {
    EnvoyRoute {
        r#match: Some(route_match(route)),
        action: Some(Action::Route(route_action(route))),
        ..Default::default()
    }
}

fn route_match(route: &Route) -> RouteMatch {
    RouteMatch {
        path_specifier: Some(PathSpecifier::Prefix(route.prefix.clone())),
        headers: route.headers.iter().map(header_matcher).collect(),
        ..Default::default()
    }
}

fn header_matcher(condition: &HeaderCondition) -> HeaderMatcher {
    HeaderMatcher {
        name: condition.name.clone(),
        header_match_specifier: Some(HeaderMatchSpecifier::StringMatch(StringMatcher {
            match_pattern: Some(MatchPattern::Exact(condition.exact.clone())),
            ignore_case: false,
        })),
        ..Default::default()
    }
}

fn route_action(route: &Route) -> RouteAction {
    let mut action = RouteAction {
        cluster_specifier: Some(cluster_specifier(route)),
        ..Default::default()
    };

    if let Some(timeout) = route.timeout {
        action.timeout = Some(proto_duration(timeout.request));
    }

    if let Some(retry) = &route.retry {
        action.retry_policy = Some(EnvoyRetryPolicy {
            retry_on: retry.retry_on.clone(),
            num_retries: (retry.num_retries > 0).then(|| UInt32Value { value: retry.num_retries }),
            per_try_timeout: (!retry.per_try_timeout.is_zero())
                .then(|| proto_duration(retry.per_try_timeout)),
            ..Default::default()
        });
    }

    if route.websocket {
        action.upgrade_configs =
            vec![UpgradeConfig { upgrade_type: "websocket".to_string(), ..Default::default() }];
    }

    if let Some(prefix) = &route.prefix_rewrite {
        action.prefix_rewrite = prefix.clone();
    }

    if route.session_affinity {
        action.hash_policy = vec![HashPolicy {
            policy_specifier: Some(hash_policy::PolicySpecifier::Cookie(hash_policy::Cookie {
                name: SESSION_AFFINITY_COOKIE.to_string(),
                ttl: Some(proto_duration(std::time::Duration::ZERO)),
                path: "/".to_string(),
                ..Default::default()
            })),
            ..Default::default()
        }];
    }

    action
}

fn cluster_specifier(route: &Route) -> ClusterSpecifier {
    match route.clusters.as_slice() {
        [single] => ClusterSpecifier::Cluster(single.name.clone()),
        clusters => ClusterSpecifier::WeightedClusters(WeightedCluster {
            clusters: clusters
                .iter()
                .map(|c| ClusterWeight {
                    name: c.name.clone(),
                    weight: Some(UInt32Value { value: c.weight }),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
    }
}
