//! # DAG to Envoy translation
//!
//! Pure functions from a [`Dag`](crate::dag::Dag) (or the endpoint objects) to
//! encoded xDS resources. Output is sorted by resource name so the same input
//! always produces byte-identical snapshots.

pub mod clusters;
pub mod endpoints;
pub mod listeners;
pub mod routes;

use envoy_types::pb::envoy::config::core::v3::{data_source, DataSource};
use envoy_types::pb::google::protobuf::{Any, Duration};
use prost::Message;

pub use clusters::clusters;
pub use endpoints::cluster_load_assignments;
pub use listeners::listeners;
pub use routes::route_configurations;

/// Route configuration and listener name for plaintext traffic.
pub const HTTP_NAME: &str = "ingress_http";
/// Route configuration and listener name for TLS traffic.
pub const HTTPS_NAME: &str = "ingress_https";

/// Largest duration protobuf accepts, 10,000 years.
const MAX_DURATION_SECONDS: i64 = 315_576_000_000;

/// Saturates at [`MAX_DURATION_SECONDS`].
pub(crate) fn proto_duration(duration: std::time::Duration) -> Duration {
    let seconds = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
    if seconds >= MAX_DURATION_SECONDS {
        return Duration { seconds: MAX_DURATION_SECONDS, nanos: 0 };
    }
    Duration { seconds, nanos: duration.subsec_nanos() as i32 }
}

pub(crate) fn inline_bytes(bytes: &[u8]) -> DataSource {
    DataSource {
        specifier: Some(data_source::Specifier::InlineBytes(bytes.to_vec())),
        ..Default::default()
    }
}

pub(crate) fn typed_any<M: Message>(type_url: &str, message: &M) -> Any {
    Any { type_url: type_url.to_string(), value: message.encode_to_vec() }
}
