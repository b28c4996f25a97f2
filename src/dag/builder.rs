//! Full DAG rebuild from the current object set.
//!
//! Both routing kinds implement [`RouteSource`]; merging, de-duplication,
//! TLS binding and ordering happen once, in [`build`].

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::config::TranslatorConfig;
use crate::objects::{
    HeaderCondition, HealthCheckSpec, HostRoute, Ingress, IngressBackend, IntOrString,
    MatchCondition, ObjectKey, ObjectMeta, RouteSpec, UpstreamValidationSpec,
};

use super::annotations;
use super::cluster_name::{cluster_name, config_hash};
use super::{
    route_order, Cluster, Dag, LbStrategy, RetryPolicy, Route, TimeoutPolicy, TlsBinding,
    TlsKeypair, UpstreamValidation, VirtualHost, WeightedCluster, WILDCARD_HOST,
};
use super::store::ObjectSet;

/// Routes one object contributes to one virtual host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostContribution {
    pub fqdn: String,
    pub tls_secret: Option<ObjectKey>,
    pub routes: Vec<Route>,
}

/// An object that turns into routes.
pub trait RouteSource {
    fn metadata(&self) -> &ObjectMeta;

    /// Routes grouped by virtual host. Malformed parts are skipped, never fatal.
    fn to_routes(&self, ctx: &mut BuildContext<'_>) -> Vec<HostContribution>;
}

/// Connection settings for one backend reference.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub strategy: Option<LbStrategy>,
    pub health_check: Option<HealthCheckSpec>,
    pub upstream_validation: Option<UpstreamValidation>,
}

/// Lookup state shared by every [`RouteSource`] during one build.
pub struct BuildContext<'a> {
    objects: &'a ObjectSet,
    config: &'a TranslatorConfig,
    clusters: BTreeMap<String, Cluster>,
}

impl<'a> BuildContext<'a> {
    fn new(objects: &'a ObjectSet, config: &'a TranslatorConfig) -> Self {
        Self { objects, config, clusters: BTreeMap::new() }
    }

    pub fn config(&self) -> &TranslatorConfig {
        self.config
    }

    /// Resolve a service port reference into a cluster name, registering the
    /// cluster. `None` when the service or the port does not exist.
    pub fn resolve_backend(
        &mut self,
        namespace: &str,
        service: &str,
        port: &IntOrString,
        options: BackendOptions,
    ) -> Option<String> {
        let key = ObjectKey::new(namespace, service);
        let Some(svc) = self.objects.service(&key) else {
            debug!(service = %key, "Backend service not found");
            return None;
        };
        let Some(service_port) = svc.lookup_port(port) else {
            debug!(service = %key, port = %port, "Backend service port not found");
            return None;
        };

        let hash = config_hash(
            options.strategy,
            options.health_check.as_ref(),
            options.upstream_validation.as_ref(),
        );
        let name = cluster_name(&key, service_port.port, &hash);

        self.clusters.entry(name.clone()).or_insert_with(|| Cluster {
            name: name.clone(),
            service: key,
            port: service_port.port,
            port_name: service_port.name.clone(),
            strategy: options.strategy,
            health_check: options.health_check,
            upstream_validation: options.upstream_validation,
        });

        Some(name)
    }

    /// Resolve a TLS secret reference made from `namespace`. A bare name is
    /// local; `other/name` is only honoured when `other` delegates that
    /// secret to `namespace`.
    pub fn secret_ref(&self, namespace: &str, reference: &str) -> Option<ObjectKey> {
        let reference = reference.trim();
        let key = match reference.split_once('/') {
            None => ObjectKey::new(namespace, reference),
            Some((ns, name)) if ns.is_empty() || name.is_empty() => {
                debug!(namespace, secret = reference, "Malformed TLS secret reference");
                return None;
            }
            Some((ns, name)) => ObjectKey::new(ns, name),
        };
        if key.name.is_empty() {
            return None;
        }

        if key.namespace != namespace && !self.objects.is_delegated(&key, namespace) {
            debug!(namespace, secret = %key, "TLS secret not delegated, serving plaintext only");
            return None;
        }
        Some(key)
    }

    /// Bind a secret to a virtual host. The keypair is only filled in for a
    /// TLS secret with a non-empty certificate and key.
    pub fn tls_binding(&self, secret: ObjectKey) -> TlsBinding {
        let keypair = self
            .objects
            .secret(&secret)
            .filter(|s| s.is_tls_type() && s.has_valid_keypair())
            .map(|s| TlsKeypair {
                certificate_chain: s.certificate().to_vec(),
                private_key: s.private_key().to_vec(),
            });

        if keypair.is_none() {
            debug!(secret = %secret, "TLS secret missing or invalid, serving plaintext only");
        }

        TlsBinding { secret, keypair }
    }

    /// Resolve the CA bundle for upstream validation.
    pub fn upstream_validation(
        &self,
        namespace: &str,
        spec: &UpstreamValidationSpec,
    ) -> Option<UpstreamValidation> {
        let key = ObjectKey::new(namespace, &spec.ca_secret);
        let ca = self.objects.secret(&key).and_then(|secret| secret.ca_bundle())?;
        Some(UpstreamValidation {
            ca_certificate: ca.to_vec(),
            subject_name: spec.subject_name.clone(),
        })
    }
}

/// Rebuild the whole DAG.
pub fn build(objects: &ObjectSet, config: &TranslatorConfig) -> Dag {
    let mut ctx = BuildContext::new(objects, config);

    let sources = objects
        .ingresses
        .values()
        .map(|ingress| ingress as &dyn RouteSource)
        .chain(objects.host_routes.values().map(|route| route as &dyn RouteSource));

    let mut hosts: BTreeMap<String, VirtualHost> = BTreeMap::new();

    for source in sources {
        let meta = source.metadata();
        if !annotations::matches_ingress_class(meta, config) {
            debug!(object = %meta.key(), "Excluded by ingress class");
            continue;
        }

        for contribution in source.to_routes(&mut ctx) {
            let vhost = hosts
                .entry(contribution.fqdn.clone())
                .or_insert_with(|| VirtualHost::new(&contribution.fqdn));

            if let Some(secret) = contribution.tls_secret {
                if let Some(existing) = &vhost.tls {
                    if existing.secret != secret {
                        debug!(
                            fqdn = %vhost.fqdn,
                            kept = %existing.secret,
                            ignored = %secret,
                            "Conflicting TLS secrets for virtual host"
                        );
                    }
                } else {
                    vhost.tls = Some(ctx.tls_binding(secret));
                }
            }

            for route in contribution.routes {
                if vhost.routes.iter().any(|existing| existing.same_match(&route)) {
                    debug!(
                        fqdn = %vhost.fqdn,
                        prefix = %route.prefix,
                        object = %meta.key(),
                        "Duplicate route match, keeping the earlier one"
                    );
                    continue;
                }
                vhost.routes.push(route);
            }
        }
    }

    hosts.retain(|_, vhost| !vhost.routes.is_empty());
    for vhost in hosts.values_mut() {
        vhost.routes.sort_by(route_order);
    }

    let referenced: BTreeSet<&str> = hosts
        .values()
        .flat_map(|vhost| vhost.routes.iter())
        .flat_map(|route| route.clusters.iter())
        .map(|cluster| cluster.name.as_str())
        .collect();

    let clusters = ctx
        .clusters
        .iter()
        .filter(|(name, _)| referenced.contains(name.as_str()))
        .map(|(name, cluster)| (name.clone(), cluster.clone()))
        .collect();

    Dag { virtual_hosts: hosts, clusters }
}

fn normalize_prefix(path: Option<&str>) -> String {
    match path.map(str::trim) {
        None | Some("") => "/".to_string(),
        Some(path) if path.starts_with('/') => path.to_string(),
        Some(path) => format!("/{}", path),
    }
}

// ---------------------------------------------------------------------------
// Ingress
// ---------------------------------------------------------------------------

struct IngressPolicy {
    timeout: Option<TimeoutPolicy>,
    retry: Option<RetryPolicy>,
    websockets: Vec<String>,
    permit_insecure: bool,
}

impl Ingress {
    fn route_for(
        &self,
        ctx: &mut BuildContext<'_>,
        policy: &IngressPolicy,
        prefix: String,
        backend: &IngressBackend,
    ) -> Option<Route> {
        let cluster = ctx.resolve_backend(
            &self.metadata.namespace,
            &backend.service_name,
            &backend.service_port,
            BackendOptions::default(),
        )?;

        Some(Route {
            websocket: policy.websockets.iter().any(|ws| *ws == prefix),
            prefix,
            clusters: vec![WeightedCluster { name: cluster, weight: 0 }],
            timeout: policy.timeout,
            retry: policy.retry.clone(),
            permit_insecure: policy.permit_insecure,
            ..Default::default()
        })
    }
}

impl RouteSource for Ingress {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn to_routes(&self, ctx: &mut BuildContext<'_>) -> Vec<HostContribution> {
        let meta = &self.metadata;
        let policy = IngressPolicy {
            timeout: annotations::request_timeout(meta),
            retry: annotations::retry_policy(meta),
            websockets: annotations::websocket_routes(meta),
            permit_insecure: !annotations::force_ssl_redirect(meta),
        };

        let mut tls_secrets: BTreeMap<&str, ObjectKey> = BTreeMap::new();
        for tls in &self.spec.tls {
            let Some(secret) = ctx.secret_ref(&meta.namespace, &tls.secret_name) else {
                continue;
            };
            for host in &tls.hosts {
                tls_secrets.entry(host.as_str()).or_insert_with(|| secret.clone());
            }
        }

        let mut by_host: BTreeMap<String, Vec<Route>> = BTreeMap::new();

        for rule in &self.spec.rules {
            let host = rule
                .host
                .as_deref()
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .unwrap_or(WILDCARD_HOST);

            let Some(http) = &rule.http else {
                debug!(ingress = %meta.key(), host, "Skipping ingress rule without http block");
                continue;
            };

            for path in &http.paths {
                let prefix = normalize_prefix(path.path.as_deref());
                if let Some(route) = self.route_for(ctx, &policy, prefix, &path.backend) {
                    by_host.entry(host.to_string()).or_default().push(route);
                }
            }
        }

        // Added after the rules so a host-less rule for "/" wins over it.
        if let Some(backend) = &self.spec.backend {
            if let Some(route) = self.route_for(ctx, &policy, "/".to_string(), backend) {
                by_host.entry(WILDCARD_HOST.to_string()).or_default().push(route);
            }
        }

        by_host
            .into_iter()
            .map(|(fqdn, routes)| HostContribution {
                tls_secret: tls_secrets.get(fqdn.as_str()).cloned(),
                fqdn,
                routes,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// HostRoute
// ---------------------------------------------------------------------------

/// Join prefix conditions into one prefix and collect header conditions.
fn match_conditions(conditions: &[MatchCondition]) -> (String, Vec<HeaderCondition>) {
    let prefixes: Vec<&str> = conditions.iter().filter_map(|c| c.prefix.as_deref()).collect();

    let prefix = match prefixes.as_slice() {
        [] => "/".to_string(),
        [single] => normalize_prefix(Some(single)),
        many => {
            let mut joined = String::new();
            for segment in many.iter().map(|p| p.trim().trim_matches('/')) {
                if !segment.is_empty() {
                    joined.push('/');
                    joined.push_str(segment);
                }
            }
            if joined.is_empty() {
                "/".to_string()
            } else {
                if many.last().is_some_and(|last| last.trim().ends_with('/')) {
                    joined.push('/');
                }
                joined
            }
        }
    };

    let mut headers: Vec<HeaderCondition> =
        conditions.iter().filter_map(|c| c.header.clone()).collect();
    headers.sort();
    headers.dedup();

    (prefix, headers)
}

fn clamp_weight(weight: Option<i64>) -> u32 {
    weight.map(|w| w.clamp(0, u32::MAX as i64) as u32).unwrap_or(0)
}

/// Several targets are sorted by (name, weight); all-zero weights become 1 each.
fn normalize_weights(clusters: &mut [WeightedCluster]) {
    if clusters.len() < 2 {
        return;
    }
    clusters.sort();
    if clusters.iter().all(|c| c.weight == 0) {
        for cluster in clusters.iter_mut() {
            cluster.weight = 1;
        }
    }
}

impl HostRoute {
    fn route_for(&self, ctx: &mut BuildContext<'_>, spec: &RouteSpec) -> Option<Route> {
        let namespace = &self.metadata.namespace;
        let (prefix, headers) = match_conditions(&spec.conditions);

        let mut clusters = Vec::with_capacity(spec.services.len());
        let mut session_affinity = false;

        for service in &spec.services {
            let strategy = match service.strategy.as_deref() {
                Some(raw) => {
                    let parsed = LbStrategy::parse(raw);
                    if parsed.is_none() {
                        debug!(route = %self.metadata.key(), strategy = raw, "Unknown load balancer strategy");
                    }
                    parsed
                }
                None => None,
            };

            let upstream_validation = match &service.upstream_validation {
                Some(uv) => match ctx.upstream_validation(namespace, uv) {
                    Some(resolved) => Some(resolved),
                    None => {
                        warn!(
                            route = %self.metadata.key(),
                            service = %service.name,
                            ca_secret = %uv.ca_secret,
                            "Upstream validation CA secret unavailable, skipping service"
                        );
                        continue;
                    }
                },
                None => None,
            };

            let options = BackendOptions {
                strategy,
                health_check: service.health_check.clone(),
                upstream_validation,
            };

            let Some(name) =
                ctx.resolve_backend(namespace, &service.name, &IntOrString::Int(service.port), options)
            else {
                continue;
            };

            session_affinity |= strategy == Some(LbStrategy::Cookie);
            clusters.push(WeightedCluster { name, weight: clamp_weight(service.weight) });
        }

        if clusters.is_empty() {
            debug!(route = %self.metadata.key(), prefix = %prefix, "No resolvable services, dropping route");
            return None;
        }
        normalize_weights(&mut clusters);

        let timeout = spec.timeout_policy.as_ref().map(|policy| TimeoutPolicy {
            request: annotations::parse_timeout(policy.request.as_deref()),
        });

        let retry = spec.retry_policy.as_ref().map(|policy| RetryPolicy {
            retry_on: annotations::DEFAULT_RETRY_ON.to_string(),
            num_retries: policy.count.unwrap_or(1).max(1),
            per_try_timeout: annotations::parse_timeout(policy.per_try_timeout.as_deref()),
        });

        Some(Route {
            prefix,
            headers,
            clusters,
            timeout,
            retry,
            session_affinity,
            websocket: spec.enable_websockets,
            prefix_rewrite: spec.prefix_rewrite.clone().filter(|p| !p.is_empty()),
            permit_insecure: spec.permit_insecure,
        })
    }
}

impl RouteSource for HostRoute {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn to_routes(&self, ctx: &mut BuildContext<'_>) -> Vec<HostContribution> {
        let meta = &self.metadata;

        if !ctx.config().is_root_namespace(&meta.namespace) {
            debug!(route = %meta.key(), "HostRoute outside root namespaces, ignoring");
            return Vec::new();
        }

        let Some(vhost) = &self.spec.virtualhost else {
            debug!(route = %meta.key(), "HostRoute without virtualhost is not a root, ignoring");
            return Vec::new();
        };

        let fqdn = vhost.fqdn.trim();
        if fqdn.is_empty() {
            warn!(route = %meta.key(), "HostRoute virtualhost has no fqdn, ignoring");
            return Vec::new();
        }

        let routes = self.spec.routes.iter().filter_map(|spec| self.route_for(ctx, spec)).collect();

        vec![HostContribution {
            fqdn: fqdn.to_string(),
            tls_secret: vhost.tls.as_ref().and_then(|tls| ctx.secret_ref(&meta.namespace, &tls.secret_name)),
            routes,
        }]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::objects::*;

    fn service(name: &str, ports: &[(&str, i32)]) -> KubeObject {
        KubeObject::Service(Service {
            metadata: ObjectMeta::new("default", name),
            spec: ServiceSpec {
                ports: ports
                    .iter()
                    .map(|(port_name, port)| ServicePort {
                        name: port_name.to_string(),
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            },
        })
    }

    fn backend(name: &str, port: i32) -> IngressBackend {
        IngressBackend { service_name: name.into(), service_port: IntOrString::Int(port) }
    }

    fn ingress(meta: ObjectMeta, spec: IngressSpec) -> KubeObject {
        KubeObject::Ingress(Ingress { metadata: meta, spec })
    }

    fn rule(host: Option<&str>, paths: &[(&str, IngressBackend)]) -> IngressRule {
        IngressRule {
            host: host.map(str::to_string),
            http: Some(HttpIngressRuleValue {
                paths: paths
                    .iter()
                    .map(|(path, backend)| HttpIngressPath {
                        path: Some(path.to_string()),
                        backend: backend.clone(),
                    })
                    .collect(),
            }),
        }
    }

    fn host_route(namespace: &str, fqdn: &str, routes: Vec<RouteSpec>) -> KubeObject {
        KubeObject::HostRoute(HostRoute {
            metadata: ObjectMeta::new(namespace, "simple"),
            spec: HostRouteSpec {
                virtualhost: Some(VirtualHostSpec { fqdn: fqdn.into(), tls: None }),
                routes,
            },
        })
    }

    fn svc_ref(name: &str, port: i32, weight: Option<i64>) -> ServiceRef {
        ServiceRef {
            name: name.into(),
            port,
            weight,
            strategy: None,
            health_check: None,
            upstream_validation: None,
        }
    }

    fn prefix_route(prefix: &str, services: Vec<ServiceRef>) -> RouteSpec {
        RouteSpec {
            conditions: vec![MatchCondition { prefix: Some(prefix.into()), header: None }],
            services,
            ..Default::default()
        }
    }

    fn build_default(objects: Vec<KubeObject>) -> Dag {
        build(&ObjectSet::from_objects(objects), &TranslatorConfig::default())
    }

    fn prefixes(dag: &Dag, host: &str) -> Vec<String> {
        dag.virtual_hosts[host].routes.iter().map(|r| r.prefix.clone()).collect()
    }

    #[test]
    fn default_backend_goes_to_wildcard() {
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            ingress(
                ObjectMeta::new("default", "kuard"),
                IngressSpec { backend: Some(backend("kuard", 80)), ..Default::default() },
            ),
        ]);

        let vhost = &dag.virtual_hosts[WILDCARD_HOST];
        assert_eq!(vhost.routes.len(), 1);
        assert_eq!(vhost.routes[0].prefix, "/");
        assert_eq!(vhost.routes[0].clusters[0].name, "default/kuard/80/da39a3ee5e");
        assert!(dag.clusters.contains_key("default/kuard/80/da39a3ee5e"));
    }

    #[test]
    fn default_backend_never_lands_in_named_host() {
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            service("other", &[("", 80)]),
            ingress(
                ObjectMeta::new("default", "mixed"),
                IngressSpec {
                    backend: Some(backend("other", 80)),
                    rules: vec![rule(Some("kuard.example.com"), &[("/", backend("kuard", 80))])],
                    ..Default::default()
                },
            ),
        ]);

        assert_eq!(dag.virtual_hosts.len(), 2);
        let named = &dag.virtual_hosts["kuard.example.com"];
        assert_eq!(named.routes[0].clusters[0].name, "default/kuard/80/da39a3ee5e");
        let wildcard = &dag.virtual_hosts[WILDCARD_HOST];
        assert_eq!(wildcard.routes[0].clusters[0].name, "default/other/80/da39a3ee5e");
    }

    #[test]
    fn rule_without_http_is_skipped() {
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            ingress(
                ObjectMeta::new("default", "broken"),
                IngressSpec {
                    rules: vec![
                        IngressRule { host: Some("nohttp.example.com".into()), http: None },
                        rule(Some("ok.example.com"), &[("/", backend("kuard", 80))]),
                    ],
                    ..Default::default()
                },
            ),
        ]);

        assert!(!dag.virtual_hosts.contains_key("nohttp.example.com"));
        assert!(dag.virtual_hosts.contains_key("ok.example.com"));
    }

    #[test]
    fn missing_service_drops_route_and_host() {
        let dag = build_default(vec![ingress(
            ObjectMeta::new("default", "kuard"),
            IngressSpec { backend: Some(backend("kuard", 80)), ..Default::default() },
        )]);
        assert!(dag.virtual_hosts.is_empty());
        assert!(dag.clusters.is_empty());
    }

    #[test]
    fn named_port_resolves_to_number() {
        let dag = build_default(vec![
            service("wowie", &[("http", 80)]),
            ingress(
                ObjectMeta::new("default", "hello"),
                IngressSpec {
                    rules: vec![rule(
                        Some("hello.example.com"),
                        &[(
                            "/",
                            IngressBackend {
                                service_name: "wowie".into(),
                                service_port: IntOrString::String("http".into()),
                            },
                        )],
                    )],
                    ..Default::default()
                },
            ),
        ]);

        let cluster = &dag.clusters["default/wowie/80/da39a3ee5e"];
        assert_eq!(cluster.eds_service_name(), "default/wowie/http");
    }

    #[test]
    fn routes_merge_across_objects_most_specific_first() {
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            ingress(
                ObjectMeta::new("default", "a"),
                IngressSpec {
                    rules: vec![rule(Some("example.com"), &[("/", backend("kuard", 80))])],
                    ..Default::default()
                },
            ),
            ingress(
                ObjectMeta::new("default", "b"),
                IngressSpec {
                    rules: vec![rule(
                        Some("example.com"),
                        &[("/a", backend("kuard", 80)), ("/ab", backend("kuard", 80))],
                    )],
                    ..Default::default()
                },
            ),
        ]);

        assert_eq!(dag.virtual_hosts.len(), 1);
        assert_eq!(prefixes(&dag, "example.com"), vec!["/ab", "/a", "/"]);
    }

    #[test]
    fn class_filtering_excludes_objects() {
        let objects = vec![
            service("kuard", &[("", 80)]),
            ingress(
                ObjectMeta::new("default", "kuard")
                    .with_annotation(annotations::LEGACY_INGRESS_CLASS, "nginx"),
                IngressSpec { backend: Some(backend("kuard", 80)), ..Default::default() },
            ),
        ];
        assert!(build_default(objects.clone()).virtual_hosts.is_empty());

        let config =
            TranslatorConfig { ingress_class: Some("nginx".into()), ..Default::default() };
        let dag = build(&ObjectSet::from_objects(objects), &config);
        assert_eq!(dag.virtual_hosts.len(), 1);
    }

    #[test]
    fn host_route_outside_root_namespaces_is_dropped() {
        let objects = vec![
            KubeObject::Service(Service {
                metadata: ObjectMeta::new("team", "kuard"),
                spec: ServiceSpec {
                    ports: vec![ServicePort { port: 8080, ..Default::default() }],
                },
            }),
            host_route("team", "example.com", vec![prefix_route("/", vec![svc_ref("kuard", 8080, None)])]),
        ];

        assert_eq!(build_default(objects.clone()).virtual_hosts.len(), 1);

        let config = TranslatorConfig { root_namespaces: vec!["roots".into()], ..Default::default() };
        assert!(build(&ObjectSet::from_objects(objects), &config).virtual_hosts.is_empty());
    }

    #[test]
    fn weighted_clusters_are_sorted_and_not_deduplicated() {
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            service("backend", &[("", 8080)]),
            host_route(
                "default",
                "example.com",
                vec![prefix_route(
                    "/",
                    vec![
                        svc_ref("kuard", 80, Some(90)),
                        svc_ref("backend", 8080, Some(10)),
                        svc_ref("kuard", 80, Some(60)),
                    ],
                )],
            ),
        ]);

        let clusters = &dag.virtual_hosts["example.com"].routes[0].clusters;
        let got: Vec<(&str, u32)> = clusters.iter().map(|c| (c.name.as_str(), c.weight)).collect();
        assert_eq!(
            got,
            vec![
                ("default/backend/8080/da39a3ee5e", 10),
                ("default/kuard/80/da39a3ee5e", 60),
                ("default/kuard/80/da39a3ee5e", 90),
            ]
        );
        assert_eq!(dag.clusters.len(), 2);
    }

    #[test]
    fn all_zero_weights_become_equal() {
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            service("backend", &[("", 8080)]),
            host_route(
                "default",
                "example.com",
                vec![prefix_route("/", vec![svc_ref("kuard", 80, None), svc_ref("backend", 8080, Some(-5))])],
            ),
        ]);

        let clusters = &dag.virtual_hosts["example.com"].routes[0].clusters;
        assert!(clusters.iter().all(|c| c.weight == 1));
    }

    #[test]
    fn cookie_strategy_enables_session_affinity() {
        let mut cookie = svc_ref("kuard", 80, None);
        cookie.strategy = Some("Cookie".into());
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            host_route("default", "example.com", vec![prefix_route("/", vec![cookie])]),
        ]);

        let route = &dag.virtual_hosts["example.com"].routes[0];
        assert!(route.session_affinity);
        let cluster = &dag.clusters[&route.clusters[0].name];
        assert_eq!(cluster.strategy, Some(LbStrategy::Cookie));
        assert!(!cluster.name.ends_with("da39a3ee5e"));
    }

    #[test]
    fn host_route_policies() {
        let spec = RouteSpec {
            timeout_policy: Some(TimeoutPolicySpec { request: Some("moo".into()) }),
            retry_policy: Some(RetryPolicySpec { count: Some(3), per_try_timeout: Some("10s".into()) }),
            enable_websockets: true,
            prefix_rewrite: Some("/".into()),
            ..prefix_route("/api", vec![svc_ref("kuard", 80, None)])
        };
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            host_route("default", "example.com", vec![spec]),
        ]);

        let route = &dag.virtual_hosts["example.com"].routes[0];
        assert_eq!(route.timeout, Some(TimeoutPolicy { request: Duration::ZERO }));
        let retry = route.retry.as_ref().unwrap();
        assert_eq!(retry.retry_on, "5xx");
        assert_eq!(retry.num_retries, 3);
        assert_eq!(retry.per_try_timeout, Duration::from_secs(10));
        assert!(route.websocket);
        assert_eq!(route.prefix_rewrite.as_deref(), Some("/"));
    }

    #[test]
    fn tls_binding_tracks_secret_validity() {
        let secret = |cert: &[u8]| {
            KubeObject::Secret(Secret {
                metadata: ObjectMeta::new("default", "cert"),
                type_: TLS_SECRET_TYPE.into(),
                data: [
                    (TLS_CERT_KEY.to_string(), cert.to_vec()),
                    (TLS_KEY_KEY.to_string(), b"key".to_vec()),
                ]
                .into_iter()
                .collect(),
            })
        };
        let tls_ingress = ingress(
            ObjectMeta::new("default", "secure"),
            IngressSpec {
                tls: vec![IngressTls { hosts: vec!["example.com".into()], secret_name: "cert".into() }],
                rules: vec![rule(Some("example.com"), &[("/", backend("kuard", 80))])],
                ..Default::default()
            },
        );

        let dag = build_default(vec![service("kuard", &[("", 80)]), tls_ingress.clone(), secret(b"")]);
        assert!(dag.virtual_hosts["example.com"].keypair().is_none());

        let dag = build_default(vec![service("kuard", &[("", 80)]), tls_ingress, secret(b"certificate")]);
        let keypair = dag.virtual_hosts["example.com"].keypair().unwrap();
        assert_eq!(keypair.certificate_chain, b"certificate");
        assert_eq!(dag.secure_virtual_hosts().count(), 1);
    }

    #[test]
    fn match_conditions_join_prefixes() {
        let cond = |p: &str| MatchCondition { prefix: Some(p.into()), header: None };
        assert_eq!(match_conditions(&[]).0, "/");
        assert_eq!(match_conditions(&[cond("api")]).0, "/api");
        assert_eq!(match_conditions(&[cond("/api"), cond("/v1/")]).0, "/api/v1/");

        let header = MatchCondition {
            prefix: None,
            header: Some(HeaderCondition { name: "x-canary".into(), exact: "true".into() }),
        };
        let (prefix, headers) = match_conditions(&[header.clone(), header]);
        assert_eq!(prefix, "/");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn rebuild_is_deterministic() {
        let objects = vec![
            service("kuard", &[("", 80)]),
            ingress(
                ObjectMeta::new("default", "kuard"),
                IngressSpec {
                    backend: Some(backend("kuard", 80)),
                    rules: vec![rule(Some("a.example.com"), &[("/x", backend("kuard", 80))])],
                    ..Default::default()
                },
            ),
        ];
        assert_eq!(build_default(objects.clone()), build_default(objects));
    }

    fn tls_secret(namespace: &str, name: &str) -> KubeObject {
        KubeObject::Secret(Secret {
            metadata: ObjectMeta::new(namespace, name),
            type_: TLS_SECRET_TYPE.into(),
            data: [
                (TLS_CERT_KEY.to_string(), b"certificate".to_vec()),
                (TLS_KEY_KEY.to_string(), b"key".to_vec()),
            ]
            .into_iter()
            .collect(),
        })
    }

    fn delegation(namespace: &str, secret_name: &str, targets: &[&str]) -> KubeObject {
        KubeObject::TlsCertificateDelegation(TlsCertificateDelegation {
            metadata: ObjectMeta::new(namespace, "delegation"),
            spec: TlsCertificateDelegationSpec {
                delegations: vec![CertificateDelegation {
                    secret_name: secret_name.into(),
                    target_namespaces: targets.iter().map(|t| t.to_string()).collect(),
                }],
            },
        })
    }

    fn tls_host_route(secret_name: &str) -> KubeObject {
        KubeObject::HostRoute(HostRoute {
            metadata: ObjectMeta::new("default", "secure"),
            spec: HostRouteSpec {
                virtualhost: Some(VirtualHostSpec {
                    fqdn: "secure.example.com".into(),
                    tls: Some(TlsSpec { secret_name: secret_name.into() }),
                }),
                routes: vec![prefix_route("/", vec![svc_ref("kuard", 80, None)])],
            },
        })
    }

    #[test]
    fn delegated_secret_binds_across_namespaces() {
        for targets in [&["default"][..], &["*"][..]] {
            let dag = build_default(vec![
                service("kuard", &[("", 80)]),
                tls_secret("shared", "wildcard"),
                delegation("shared", "wildcard", targets),
                tls_host_route("shared/wildcard"),
            ]);

            let vhost = &dag.virtual_hosts["secure.example.com"];
            assert_eq!(vhost.tls.as_ref().unwrap().secret, ObjectKey::new("shared", "wildcard"));
            assert_eq!(vhost.keypair().unwrap().certificate_chain, b"certificate");
        }
    }

    #[test]
    fn undelegated_secret_is_not_bound() {
        for extra in [
            Vec::new(),
            vec![delegation("shared", "wildcard", &["elsewhere"])],
            vec![delegation("shared", "other", &["default"])],
            vec![delegation("default", "wildcard", &["default"])],
        ] {
            let mut objects =
                vec![service("kuard", &[("", 80)]), tls_secret("shared", "wildcard"), tls_host_route("shared/wildcard")];
            objects.extend(extra);
            let dag = build_default(objects);

            let vhost = &dag.virtual_hosts["secure.example.com"];
            assert!(vhost.tls.is_none());
            assert!(vhost.keypair().is_none());
            assert_eq!(vhost.routes.len(), 1);
        }
    }

    #[test]
    fn local_secret_reference_needs_no_delegation() {
        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            tls_secret("default", "cert"),
            tls_host_route("default/cert"),
        ]);
        assert!(dag.virtual_hosts["secure.example.com"].keypair().is_some());

        let dag = build_default(vec![service("kuard", &[("", 80)]), tls_host_route("/cert")]);
        assert!(dag.virtual_hosts["secure.example.com"].tls.is_none());
    }

    #[test]
    fn ingress_tls_honours_delegation() {
        let secure = ingress(
            ObjectMeta::new("default", "secure"),
            IngressSpec {
                tls: vec![IngressTls { hosts: vec!["example.com".into()], secret_name: "shared/wildcard".into() }],
                rules: vec![rule(Some("example.com"), &[("/", backend("kuard", 80))])],
                ..Default::default()
            },
        );

        let dag = build_default(vec![service("kuard", &[("", 80)]), tls_secret("shared", "wildcard"), secure.clone()]);
        assert!(dag.virtual_hosts["example.com"].tls.is_none());

        let dag = build_default(vec![
            service("kuard", &[("", 80)]),
            tls_secret("shared", "wildcard"),
            delegation("shared", "wildcard", &["default"]),
            secure,
        ]);
        assert!(dag.virtual_hosts["example.com"].keypair().is_some());
    }
}
