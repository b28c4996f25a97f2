//! LDS: the plaintext listener and, when any virtual host has a usable
//! certificate, the TLS listener with one SNI filter chain per host.

use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, socket_address::PortSpecifier,
    transport_socket::ConfigType as TransportSocketConfigType, Address, SocketAddress,
    TransportSocket,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType as FilterConfigType, listener_filter::ConfigType as ListenerFilterConfigType,
    Filter, FilterChain, FilterChainMatch, Listener, ListenerFilter,
};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router as RouterFilter;
use envoy_types::pb::envoy::extensions::filters::listener::tls_inspector::v3::TlsInspector;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier},
    http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter, Rds,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    CommonTlsContext, DownstreamTlsContext, TlsCertificate,
};

use super::clusters::{ads_config_source, TLS_TRANSPORT_SOCKET};
use super::{inline_bytes, typed_any, HTTPS_NAME, HTTP_NAME};
use crate::config::ListenerConfig;
use crate::dag::{Dag, TlsKeypair};
use crate::xds::resources::{BuiltResource, ResourceType};

pub const HTTP_CONNECTION_MANAGER_FILTER: &str = "envoy.filters.network.http_connection_manager";
pub const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
pub const ROUTER_FILTER_NAME: &str = "envoy.filters.http.router";
pub const ROUTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
pub const TLS_INSPECTOR_FILTER: &str = "envoy.filters.listener.tls_inspector";
pub const TLS_INSPECTOR_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector";
pub const DOWNSTREAM_TLS_CONTEXT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext";

pub fn listeners(dag: &Dag, config: &ListenerConfig) -> Vec<BuiltResource> {
    let http = Listener {
        name: HTTP_NAME.to_string(),
        address: Some(socket_address(&config.address, config.http_port)),
        filter_chains: vec![FilterChain {
            filters: vec![http_connection_manager(HTTP_NAME)],
            ..Default::default()
        }],
        ..Default::default()
    };
    let mut built = vec![BuiltResource::encode(HTTP_NAME, ResourceType::Listener, &http)];

    let secure_chains: Vec<FilterChain> = dag
        .secure_virtual_hosts()
        .filter_map(|vhost| vhost.keypair().map(|keypair| sni_filter_chain(&vhost.fqdn, keypair)))
        .collect();

    if !secure_chains.is_empty() {
        let https = Listener {
            name: HTTPS_NAME.to_string(),
            address: Some(socket_address(&config.address, config.https_port)),
            listener_filters: vec![ListenerFilter {
                name: TLS_INSPECTOR_FILTER.to_string(),
                config_type: Some(ListenerFilterConfigType::TypedConfig(typed_any(
                    TLS_INSPECTOR_TYPE_URL,
                    &TlsInspector::default(),
                ))),
                ..Default::default()
            }],
            filter_chains: secure_chains,
            ..Default::default()
        };
        built.push(BuiltResource::encode(HTTPS_NAME, ResourceType::Listener, &https));
    }

    built
}

fn socket_address(address: &str, port: u16) -> Address {
    Address {
        address: Some(AddressType::SocketAddress(SocketAddress {
            address: address.to_string(),
            port_specifier: Some(PortSpecifier::PortValue(u32::from(port))),
            ..Default::default()
        })),
    }
}

/// HTTP connection manager that fetches `route_config_name` over ADS.
fn http_connection_manager(route_config_name: &str) -> Filter {
    let router = HttpFilter {
        name: ROUTER_FILTER_NAME.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(typed_any(
            ROUTER_TYPE_URL,
            &RouterFilter::default(),
        ))),
        ..Default::default()
    };

    let hcm = HttpConnectionManager {
        codec_type: CodecType::Auto as i32,
        stat_prefix: route_config_name.to_string(),
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            config_source: Some(ads_config_source()),
            route_config_name: route_config_name.to_string(),
        })),
        http_filters: vec![router],
        ..Default::default()
    };

    Filter {
        name: HTTP_CONNECTION_MANAGER_FILTER.to_string(),
        config_type: Some(FilterConfigType::TypedConfig(typed_any(
            HTTP_CONNECTION_MANAGER_TYPE_URL,
            &hcm,
        ))),
    }
}

fn sni_filter_chain(fqdn: &str, keypair: &TlsKeypair) -> FilterChain {
    let context = DownstreamTlsContext {
        common_tls_context: Some(CommonTlsContext {
            tls_certificates: vec![TlsCertificate {
                certificate_chain: Some(inline_bytes(&keypair.certificate_chain)),
                private_key: Some(inline_bytes(&keypair.private_key)),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    };

    FilterChain {
        filter_chain_match: Some(FilterChainMatch {
            server_names: vec![fqdn.to_string()],
            ..Default::default()
        }),
        filters: vec![http_connection_manager(HTTPS_NAME)],
        transport_socket: Some(TransportSocket {
            name: TLS_TRANSPORT_SOCKET.to_string(),
            config_type: Some(TransportSocketConfigType::TypedConfig(typed_any(
                DOWNSTREAM_TLS_CONTEXT_TYPE_URL,
                &context,
            ))),
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{TlsBinding, VirtualHost};
    use crate::objects::ObjectKey;
    use prost::Message;

    fn secure_host(fqdn: &str, keypair: Option<TlsKeypair>) -> VirtualHost {
        let mut vhost = VirtualHost::new(fqdn);
        vhost.tls = Some(TlsBinding { secret: ObjectKey::new("default", "cert"), keypair });
        vhost
    }

    fn keypair() -> TlsKeypair {
        TlsKeypair { certificate_chain: b"crt".to_vec(), private_key: b"key".to_vec() }
    }

    #[test]
    fn plaintext_listener_only_without_certificates() {
        let mut dag = Dag::default();
        dag.virtual_hosts.insert("a.com".into(), secure_host("a.com", None));

        let built = listeners(&dag, &ListenerConfig::default());
        assert_eq!(built.len(), 1);
        let http: Listener = built[0].decode().unwrap();
        assert_eq!(http.name, "ingress_http");

        let Some(AddressType::SocketAddress(socket)) = http.address.unwrap().address else {
            panic!("expected socket address");
        };
        assert_eq!(socket.address, "0.0.0.0");
        assert_eq!(socket.port_specifier, Some(PortSpecifier::PortValue(8080)));

        let filter = &http.filter_chains[0].filters[0];
        let Some(FilterConfigType::TypedConfig(any)) = &filter.config_type else {
            panic!("missing hcm config");
        };
        let hcm = HttpConnectionManager::decode(any.value.as_slice()).unwrap();
        match hcm.route_specifier {
            Some(RouteSpecifier::Rds(rds)) => assert_eq!(rds.route_config_name, "ingress_http"),
            other => panic!("expected rds, got {:?}", other),
        }
        assert_eq!(hcm.http_filters[0].name, ROUTER_FILTER_NAME);
    }

    #[test]
    fn secure_hosts_get_sni_chains() {
        let mut dag = Dag::default();
        for host in ["b.com", "a.com"] {
            dag.virtual_hosts.insert(host.into(), secure_host(host, Some(keypair())));
        }
        dag.virtual_hosts.insert("plain.com".into(), VirtualHost::new("plain.com"));

        let config = ListenerConfig { https_port: 9443, ..Default::default() };
        let built = listeners(&dag, &config);
        assert_eq!(built.len(), 2);
        let https: Listener = built[1].decode().unwrap();

        assert_eq!(https.name, "ingress_https");
        assert_eq!(https.listener_filters[0].name, TLS_INSPECTOR_FILTER);
        let names: Vec<_> = https
            .filter_chains
            .iter()
            .map(|chain| chain.filter_chain_match.as_ref().unwrap().server_names.clone())
            .collect();
        assert_eq!(names, vec![vec!["a.com".to_string()], vec!["b.com".to_string()]]);
        assert!(https.filter_chains.iter().all(|chain| chain.transport_socket.is_some()));

        let Some(AddressType::SocketAddress(socket)) = https.address.unwrap().address else {
            panic!("expected socket address");
        };
        assert_eq!(socket.port_specifier, Some(PortSpecifier::PortValue(9443)));
    }
}
