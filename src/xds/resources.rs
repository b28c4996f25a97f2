use std::fmt;

use envoy_types::pb::google::protobuf::Any;
use prost::Message;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

/// The four resource types served to proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Cluster,
    Route,
    Listener,
    Endpoint,
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] =
        [ResourceType::Cluster, ResourceType::Route, ResourceType::Listener, ResourceType::Endpoint];

    pub fn type_url(&self) -> &'static str {
        match self {
            ResourceType::Cluster => CLUSTER_TYPE_URL,
            ResourceType::Route => ROUTE_TYPE_URL,
            ResourceType::Listener => LISTENER_TYPE_URL,
            ResourceType::Endpoint => ENDPOINT_TYPE_URL,
        }
    }

    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.type_url() == type_url)
    }

    /// Short discovery service name, used in logs and metrics
    pub fn short_name(&self) -> &'static str {
        match self {
            ResourceType::Cluster => "cds",
            ResourceType::Route => "rds",
            ResourceType::Listener => "lds",
            ResourceType::Endpoint => "eds",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A named, already encoded xDS resource.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    pub fn encode<M: Message>(name: impl Into<String>, resource_type: ResourceType, message: &M) -> Self {
        Self {
            name: name.into(),
            resource: Any {
                type_url: resource_type.type_url().to_string(),
                value: message.encode_to_vec(),
            },
        }
    }

    pub fn into_any(self) -> Any {
        self.resource
    }

    pub fn type_url(&self) -> &str {
        &self.resource.type_url
    }

    /// Decode the payload back into its message type.
    pub fn decode<M: Message + Default>(&self) -> crate::Result<M> {
        M::decode(self.resource.value.as_slice()).map_err(|e| {
            crate::Error::serialization(format!("failed to decode '{}': {}", self.name, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_types::pb::envoy::config::cluster::v3::Cluster;

    #[test]
    fn type_urls_resolve_both_ways() {
        for ty in ResourceType::ALL {
            assert_eq!(ResourceType::from_type_url(ty.type_url()), Some(ty));
        }
        assert_eq!(ResourceType::from_type_url("type.googleapis.com/unknown"), None);
        assert_eq!(ResourceType::from_type_url(""), None);
    }

    #[test]
    fn built_resource_carries_type_url() {
        let cluster = Cluster { name: "default/kuard/80/da39a3ee5e".into(), ..Default::default() };
        let built = BuiltResource::encode(cluster.name.clone(), ResourceType::Cluster, &cluster);

        assert_eq!(built.type_url(), CLUSTER_TYPE_URL);
        let decoded: Cluster = built.decode().unwrap();
        assert_eq!(decoded.name, "default/kuard/80/da39a3ee5e");
    }
}
