//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::{route::Action, RouteConfiguration, VirtualHost};
use routeplane::config::{ListenerConfig, TranslatorConfig};
use routeplane::objects::{manifest, KubeObject};
use routeplane::xds::{EventHandler, ResourceCache, ResourceType};

pub const KUARD_SERVICE: &str = r#"
kind: Service
metadata:
  name: kuard
  namespace: default
spec:
  ports:
    - port: 80
      targetPort: 8080
"#;

pub const KUARD_INGRESS: &str = r#"
kind: Ingress
metadata:
  name: kuard
  namespace: default
spec:
  backend:
    serviceName: kuard
    servicePort: 80
"#;

pub const KUARD_CLUSTER: &str = "default/kuard/80/da39a3ee5e";

/// `tls.crt` = "certificate", `tls.key` = "key"
pub const VALID_SECRET: &str = r#"
kind: Secret
metadata:
  name: hello-kitty
  namespace: default
type: kubernetes.io/tls
data:
  tls.crt: Y2VydGlmaWNhdGU=
  tls.key: a2V5
"#;

pub const INVALID_SECRET: &str = r#"
kind: Secret
metadata:
  name: hello-kitty
  namespace: default
type: kubernetes.io/tls
data:
  tls.crt: Y2VydGlmaWNhdGU=
  tls.key: ""
"#;

/// Parse a single-document manifest.
pub fn object(yaml: &str) -> KubeObject {
    let mut objects = manifest::load_documents(yaml).expect("fixture must parse");
    assert_eq!(objects.len(), 1, "fixture must hold exactly one object");
    objects.remove(0)
}

/// Ingress for `host` with TLS from `hello-kitty`, optionally forcing HTTPS.
pub fn tls_ingress(host: &str, force_ssl: bool) -> KubeObject {
    let annotations = if force_ssl {
        "  annotations:\n    ingress.kubernetes.io/force-ssl-redirect: \"true\"\n"
    } else {
        ""
    };
    object(&format!(
        r#"
kind: Ingress
metadata:
  name: kuard-tls
  namespace: default
{annotations}spec:
  tls:
    - hosts: ["{host}"]
      secretName: hello-kitty
  rules:
    - host: {host}
      http:
        paths:
          - path: /
            backend:
              serviceName: kuard
              servicePort: 80
"#
    ))
}

pub fn handler() -> (Arc<ResourceCache>, EventHandler) {
    handler_with(TranslatorConfig::default())
}

pub fn handler_with(translator: TranslatorConfig) -> (Arc<ResourceCache>, EventHandler) {
    let cache = Arc::new(ResourceCache::new());
    let handler = EventHandler::new(Arc::clone(&cache), translator, ListenerConfig::default());
    (cache, handler)
}

pub fn versions(cache: &ResourceCache) -> [u64; 4] {
    ResourceType::ALL.map(|ty| cache.version(ty))
}

pub fn route_config(cache: &ResourceCache, name: &str) -> RouteConfiguration {
    cache
        .get(ResourceType::Route)
        .get(name)
        .unwrap_or_else(|| panic!("route configuration {} missing", name))
        .decode()
        .expect("route configuration must decode")
}

pub fn listeners(cache: &ResourceCache) -> Vec<Listener> {
    cache
        .get(ResourceType::Listener)
        .resources()
        .iter()
        .map(|r| r.decode().expect("listener must decode"))
        .collect()
}

pub fn vhost<'a>(config: &'a RouteConfiguration, name: &str) -> &'a VirtualHost {
    config
        .virtual_hosts
        .iter()
        .find(|vh| vh.name == name)
        .unwrap_or_else(|| panic!("virtual host {} missing from {}", name, config.name))
}

pub fn is_redirect(vhost: &VirtualHost) -> bool {
    matches!(vhost.routes[0].action, Some(Action::Redirect(_)))
}
