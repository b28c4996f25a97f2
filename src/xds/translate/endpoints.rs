//! EDS: one load assignment per Endpoints object and port.

use std::collections::BTreeMap;

use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, socket_address::PortSpecifier, Address, SocketAddress,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint::HostIdentifier, ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints,
};

use crate::dag::endpoint_service_name;
use crate::objects::Endpoints;
use crate::xds::resources::{BuiltResource, ResourceType};

pub fn cluster_load_assignments<'a>(
    endpoints: impl IntoIterator<Item = &'a Endpoints>,
) -> Vec<BuiltResource> {
    let mut assignments: BTreeMap<String, Vec<(String, u16)>> = BTreeMap::new();

    for object in endpoints {
        let key = object.metadata.key();
        for subset in &object.subsets {
            for port in &subset.ports {
                let hosts = assignments.entry(endpoint_service_name(&key, &port.name)).or_default();
                hosts.extend(subset.addresses.iter().map(|address| (address.ip.clone(), port.port)));
            }
        }
    }

    assignments
        .into_iter()
        .map(|(name, mut hosts)| {
            hosts.sort();
            hosts.dedup();
            let assignment = ClusterLoadAssignment {
                cluster_name: name.clone(),
                endpoints: vec![LocalityLbEndpoints {
                    lb_endpoints: hosts.iter().map(|(ip, port)| lb_endpoint(ip, *port)).collect(),
                    ..Default::default()
                }],
                ..Default::default()
            };
            BuiltResource::encode(name, ResourceType::Endpoint, &assignment)
        })
        .collect()
}

fn lb_endpoint(ip: &str, port: u16) -> LbEndpoint {
    LbEndpoint {
        host_identifier: Some(HostIdentifier::Endpoint(Endpoint {
            address: Some(Address {
                address: Some(AddressType::SocketAddress(SocketAddress {
                    address: ip.to_string(),
                    port_specifier: Some(PortSpecifier::PortValue(u32::from(port))),
                    ..Default::default()
                })),
            }),
            ..Default::default()
        })),
        ..Default::default()
    }
}
