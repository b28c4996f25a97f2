//! # Input Objects
//!
//! Typed representations of the orchestration objects routeplane consumes.
//! Field names follow the Kubernetes wire format (camelCase) so the same
//! structs deserialize watch payloads and YAML manifests.

pub mod manifest;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Secret type carrying a certificate and private key
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";
/// Secret data key holding the certificate chain
pub const TLS_CERT_KEY: &str = "tls.crt";
/// Secret data key holding the private key
pub const TLS_KEY_KEY: &str = "tls.key";
/// Secret data key holding a CA bundle for upstream validation
pub const CA_CERT_KEY: &str = "ca.crt";

/// Identity of an object: `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into(), annotations: BTreeMap::new() }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Either a port number or a port name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    Int(i32),
    String(String),
}

impl fmt::Display for IntOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOrString::Int(port) => write!(f, "{}", port),
            IntOrString::String(name) => f.write_str(name),
        }
    }
}

// ---------------------------------------------------------------------------
// Ingress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingress {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: IngressSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<IngressBackend>,
    #[serde(default)]
    pub tls: Vec<IngressTls>,
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressBackend {
    pub service_name: String,
    pub service_port: IntOrString,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressTls {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub secret_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpIngressRuleValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpIngressRuleValue {
    #[serde(default)]
    pub paths: Vec<HttpIngressPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpIngressPath {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub backend: IngressBackend,
}

// ---------------------------------------------------------------------------
// HostRoute
// ---------------------------------------------------------------------------

/// Rich routing object: one root virtual host with per-route policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRoute {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: HostRouteSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtualhost: Option<VirtualHostSpec>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHostSpec {
    pub fqdn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    pub secret_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default)]
    pub conditions: Vec<MatchCondition>,
    #[serde(default)]
    pub services: Vec<ServiceRef>,
    #[serde(default)]
    pub enable_websockets: bool,
    #[serde(default)]
    pub permit_insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_rewrite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_policy: Option<TimeoutPolicySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicySpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HeaderCondition {
    pub name: String,
    pub exact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    pub name: String,
    pub port: i32,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_validation: Option<UpstreamValidationSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub interval_seconds: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
    #[serde(default)]
    pub unhealthy_threshold_count: Option<u32>,
    #[serde(default)]
    pub healthy_threshold_count: Option<u32>,
}

pub const HEALTH_CHECK_TIMEOUT_SECONDS: u32 = 2;
pub const HEALTH_CHECK_INTERVAL_SECONDS: u32 = 10;
pub const HEALTH_CHECK_UNHEALTHY_THRESHOLD: u32 = 3;
pub const HEALTH_CHECK_HEALTHY_THRESHOLD: u32 = 2;

/// Accessors returning what the proxy is actually configured with.
/// Unset and zero values fall back to the defaults above.
impl HealthCheckSpec {
    pub fn effective_timeout_seconds(&self) -> u32 {
        or_default(self.timeout_seconds, HEALTH_CHECK_TIMEOUT_SECONDS)
    }

    pub fn effective_interval_seconds(&self) -> u32 {
        or_default(self.interval_seconds, HEALTH_CHECK_INTERVAL_SECONDS)
    }

    pub fn effective_unhealthy_threshold(&self) -> u32 {
        or_default(self.unhealthy_threshold_count, HEALTH_CHECK_UNHEALTHY_THRESHOLD)
    }

    pub fn effective_healthy_threshold(&self) -> u32 {
        or_default(self.healthy_threshold_count, HEALTH_CHECK_HEALTHY_THRESHOLD)
    }
}

fn or_default(value: Option<u32>, default: u32) -> u32 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamValidationSpec {
    pub ca_secret: String,
    pub subject_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeoutPolicySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicySpec {
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_try_timeout: Option<String>,
}

// ---------------------------------------------------------------------------
// Service, Secret, Endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<IntOrString>,
}

impl Service {
    /// Find the port a backend reference points at, by number or by name.
    pub fn lookup_port(&self, port: &IntOrString) -> Option<&ServicePort> {
        self.spec.ports.iter().find(|candidate| match port {
            IntOrString::Int(number) => candidate.port == *number,
            IntOrString::String(name) => !name.is_empty() && candidate.name == *name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default, with = "base64_map")]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    /// Whether this secret holds a serving certificate
    pub fn is_tls_type(&self) -> bool {
        self.type_ == TLS_SECRET_TYPE
    }

    /// TLS secrets and CA bundles can influence a build; anything else cannot.
    pub fn is_tracked(&self) -> bool {
        self.is_tls_type() || self.ca_bundle().is_some()
    }

    /// Certificate and key are both present and non-empty
    pub fn has_valid_keypair(&self) -> bool {
        let present = |key: &str| self.data.get(key).is_some_and(|bytes| !bytes.is_empty());
        present(TLS_CERT_KEY) && present(TLS_KEY_KEY)
    }

    pub fn certificate(&self) -> &[u8] {
        self.data.get(TLS_CERT_KEY).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn private_key(&self) -> &[u8] {
        self.data.get(TLS_KEY_KEY).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn ca_bundle(&self) -> Option<&[u8]> {
        self.data.get(CA_CERT_KEY).map(Vec::as_slice).filter(|bytes| !bytes.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub subsets: Vec<EndpointSubset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSubset {
    #[serde(default)]
    pub addresses: Vec<EndpointAddress>,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    #[serde(default)]
    pub name: String,
    pub port: u16,
}

// ---------------------------------------------------------------------------
// TLSCertificateDelegation
// ---------------------------------------------------------------------------

/// Grants routes in other namespaces use of secrets in this object's
/// namespace. Routes refer to a delegated secret as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsCertificateDelegation {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TlsCertificateDelegationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsCertificateDelegationSpec {
    #[serde(default)]
    pub delegations: Vec<CertificateDelegation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDelegation {
    pub secret_name: String,
    #[serde(default)]
    pub target_namespaces: Vec<String>,
}

/// Target namespace matching every namespace
pub const ALL_NAMESPACES: &str = "*";

impl TlsCertificateDelegation {
    /// Whether `secret_name`, in this object's namespace, is delegated to
    /// `namespace`.
    pub fn permits(&self, secret_name: &str, namespace: &str) -> bool {
        self.spec.delegations.iter().any(|delegation| {
            delegation.secret_name == secret_name
                && delegation.target_namespaces.iter().any(|target| target == namespace || target == ALL_NAMESPACES)
        })
    }
}

// ---------------------------------------------------------------------------
// Tagged union of everything the event handler accepts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum KubeObject {
    Ingress(Ingress),
    HostRoute(HostRoute),
    Service(Service),
    Secret(Secret),
    Endpoints(Endpoints),
    #[serde(rename = "TLSCertificateDelegation")]
    TlsCertificateDelegation(TlsCertificateDelegation),
}

impl KubeObject {
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            KubeObject::Ingress(obj) => &obj.metadata,
            KubeObject::HostRoute(obj) => &obj.metadata,
            KubeObject::Service(obj) => &obj.metadata,
            KubeObject::Secret(obj) => &obj.metadata,
            KubeObject::Endpoints(obj) => &obj.metadata,
            KubeObject::TlsCertificateDelegation(obj) => &obj.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata().key()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            KubeObject::Ingress(_) => "Ingress",
            KubeObject::HostRoute(_) => "HostRoute",
            KubeObject::Service(_) => "Service",
            KubeObject::Secret(_) => "Secret",
            KubeObject::Endpoints(_) => "Endpoints",
            KubeObject::TlsCertificateDelegation(_) => "TLSCertificateDelegation",
        }
    }
}

impl From<Ingress> for KubeObject {
    fn from(obj: Ingress) -> Self {
        KubeObject::Ingress(obj)
    }
}

impl From<HostRoute> for KubeObject {
    fn from(obj: HostRoute) -> Self {
        KubeObject::HostRoute(obj)
    }
}

impl From<Service> for KubeObject {
    fn from(obj: Service) -> Self {
        KubeObject::Service(obj)
    }
}

impl From<Secret> for KubeObject {
    fn from(obj: Secret) -> Self {
        KubeObject::Secret(obj)
    }
}

impl From<Endpoints> for KubeObject {
    fn from(obj: Endpoints) -> Self {
        KubeObject::Endpoints(obj)
    }
}

impl From<TlsCertificateDelegation> for KubeObject {
    fn from(obj: TlsCertificateDelegation) -> Self {
        KubeObject::TlsCertificateDelegation(obj)
    }
}

/// Secret payloads travel base64 encoded.
mod base64_map {
    use std::collections::BTreeMap;

    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(map: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(key, bytes)| (key, STANDARD.encode(bytes))))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, encoded)| {
                STANDARD
                    .decode(encoded.trim())
                    .map(|bytes| (key.clone(), bytes))
                    .map_err(|e| D::Error::custom(format!("secret key '{}': {}", key, e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(ports: Vec<ServicePort>) -> Service {
        Service { metadata: ObjectMeta::new("default", "kuard"), spec: ServiceSpec { ports } }
    }

    #[test]
    fn lookup_port_by_number_and_name() {
        let svc = service(vec![
            ServicePort { name: "http".into(), port: 80, ..Default::default() },
            ServicePort { name: "admin".into(), port: 9000, ..Default::default() },
        ]);

        assert_eq!(svc.lookup_port(&IntOrString::Int(9000)).map(|p| p.name.as_str()), Some("admin"));
        assert_eq!(svc.lookup_port(&IntOrString::String("http".into())).map(|p| p.port), Some(80));
        assert!(svc.lookup_port(&IntOrString::Int(8080)).is_none());
        assert!(svc.lookup_port(&IntOrString::String("grpc".into())).is_none());
    }

    #[test]
    fn unnamed_port_is_not_matched_by_empty_name() {
        let svc = service(vec![ServicePort { port: 80, ..Default::default() }]);
        assert!(svc.lookup_port(&IntOrString::String(String::new())).is_none());
    }

    #[test]
    fn secret_keypair_validity() {
        let mut secret = Secret {
            metadata: ObjectMeta::new("default", "hello-kitty"),
            type_: TLS_SECRET_TYPE.to_string(),
            data: BTreeMap::new(),
        };
        assert!(!secret.has_valid_keypair());

        secret.data.insert(TLS_CERT_KEY.into(), Vec::new());
        secret.data.insert(TLS_KEY_KEY.into(), b"key".to_vec());
        assert!(!secret.has_valid_keypair());

        secret.data.insert(TLS_CERT_KEY.into(), b"certificate".to_vec());
        assert!(secret.has_valid_keypair());
        assert_eq!(secret.certificate(), b"certificate");
    }

    #[test]
    fn delegation_matches_secret_and_namespace() {
        let delegation: TlsCertificateDelegation = serde_yaml::from_str(
            r#"
metadata:
  name: certs
  namespace: shared
spec:
  delegations:
    - secretName: wildcard
      targetNamespaces: [team-a]
    - secretName: public
      targetNamespaces: ["*"]
"#,
        )
        .unwrap();

        assert!(delegation.permits("wildcard", "team-a"));
        assert!(!delegation.permits("wildcard", "team-b"));
        assert!(delegation.permits("public", "team-b"));
        assert!(!delegation.permits("other", "team-a"));
    }

    #[test]
    fn health_check_effective_values() {
        let spec = HealthCheckSpec {
            path: "/healthz".into(),
            interval_seconds: Some(5),
            timeout_seconds: Some(0),
            ..Default::default()
        };
        assert_eq!(spec.effective_interval_seconds(), 5);
        assert_eq!(spec.effective_timeout_seconds(), HEALTH_CHECK_TIMEOUT_SECONDS);
        assert_eq!(spec.effective_unhealthy_threshold(), 3);
        assert_eq!(spec.effective_healthy_threshold(), 2);
    }

    #[test]
    fn object_key_display() {
        assert_eq!(ObjectKey::new("default", "kuard").to_string(), "default/kuard");
    }
}
