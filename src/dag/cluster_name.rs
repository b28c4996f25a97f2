//! Content-addressed cluster names.
//!
//! A cluster name is `namespace/service/port/hash`, where `hash` covers only the
//! settings that change how the proxy connects to the backend. Two references
//! with the same service, port and connection settings always share a name.

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::objects::{HealthCheckSpec, ObjectKey};

use super::{LbStrategy, UpstreamValidation};

/// Hex characters of the config digest kept in a cluster name.
pub const CONFIG_HASH_LEN: usize = 10;
/// Names at or over this length get shortened.
pub const MAX_NAME_LEN: usize = 60;
const SHORT_HASH_LEN: usize = 6;

fn sha1_hex(input: &[u8]) -> String {
    hex::encode(Sha1::digest(input))
}

fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// SHA-1 of the connection-affecting settings of a cluster.
///
/// With nothing set this is the digest of empty input, `da39a3ee5e`.
/// Health-check fields are hashed at their effective values so an explicit
/// default and an omitted field name the same cluster.
pub fn config_hash(
    strategy: Option<LbStrategy>,
    health_check: Option<&HealthCheckSpec>,
    upstream_validation: Option<&UpstreamValidation>,
) -> String {
    let mut buf: Vec<u8> = Vec::new();

    if let Some(strategy) = strategy {
        buf.extend_from_slice(strategy.as_str().as_bytes());
    }

    if let Some(hc) = health_check {
        let rendered = format!(
            "hc|{}|{}|{}|{}|{}|{}",
            hc.effective_timeout_seconds(),
            hc.effective_interval_seconds(),
            hc.effective_unhealthy_threshold(),
            hc.effective_healthy_threshold(),
            hc.host.as_deref().unwrap_or_default(),
            hc.path,
        );
        buf.extend_from_slice(rendered.as_bytes());
    }

    if let Some(uv) = upstream_validation {
        buf.extend_from_slice(b"uv|");
        buf.extend_from_slice(&uv.ca_certificate);
        buf.extend_from_slice(uv.subject_name.as_bytes());
    }

    let mut digest = sha1_hex(&buf);
    digest.truncate(CONFIG_HASH_LEN);
    digest
}

/// `namespace/service/port/hash`, shortened when too long.
pub fn cluster_name(service: &ObjectKey, port: i32, config_hash: &str) -> String {
    let port = port.to_string();
    hashname(MAX_NAME_LEN, &[&service.namespace, &service.name, &port, config_hash])
}

/// Join `parts` with `/`. When the result is `limit` bytes or longer, truncate
/// parts from the right, each to `limit / parts.len()` bytes with a short
/// digest of the full name as suffix, until it fits.
pub fn hashname(limit: usize, parts: &[&str]) -> String {
    let joined = parts.join("/");
    if joined.len() < limit || parts.is_empty() {
        return joined;
    }

    let digest = sha256_hex(joined.as_bytes());
    let suffix = &digest[..SHORT_HASH_LEN];
    let per_part = limit / parts.len();

    let mut parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
    for index in (0..parts.len()).rev() {
        parts[index] = truncate(per_part, &parts[index], suffix);
        let joined = parts.join("/");
        if joined.len() < limit {
            return joined;
        }
    }

    truncate(limit, &parts.join("/"), suffix)
}

fn truncate(limit: usize, s: &str, suffix: &str) -> String {
    if limit >= s.len() {
        return s.to_string();
    }
    if limit > suffix.len() {
        let mut out = prefix(s, limit - suffix.len()).to_string();
        out.push_str(suffix);
        return out;
    }
    prefix(s, limit).to_string()
}

fn prefix(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_hashes_empty_input() {
        assert_eq!(config_hash(None, None, None), "da39a3ee5e");
    }

    #[test]
    fn strategy_hashes_its_name() {
        assert_eq!(config_hash(Some(LbStrategy::Cookie), None, None), "e4f81994fe");
        let hash = config_hash(Some(LbStrategy::Cookie), None, None);
        assert_eq!(cluster_name(&ObjectKey::new("default", "app"), 80, &hash), "default/app/80/e4f81994fe");
    }

    #[test]
    fn health_check_defaults_hash_like_omitted_fields() {
        let omitted = HealthCheckSpec { path: "/healthz".into(), ..Default::default() };
        let explicit = HealthCheckSpec {
            path: "/healthz".into(),
            timeout_seconds: Some(2),
            interval_seconds: Some(10),
            unhealthy_threshold_count: Some(3),
            healthy_threshold_count: Some(2),
            ..Default::default()
        };
        let zeroed = HealthCheckSpec { timeout_seconds: Some(0), ..omitted.clone() };
        let changed = HealthCheckSpec { timeout_seconds: Some(5), ..omitted.clone() };

        assert_eq!(config_hash(None, Some(&omitted), None), config_hash(None, Some(&explicit), None));
        assert_eq!(config_hash(None, Some(&omitted), None), config_hash(None, Some(&zeroed), None));
        assert_ne!(config_hash(None, Some(&omitted), None), config_hash(None, Some(&changed), None));
    }

    #[test]
    fn default_cluster_name() {
        let name = cluster_name(&ObjectKey::new("default", "kuard"), 80, &config_hash(None, None, None));
        assert_eq!(name, "default/kuard/80/da39a3ee5e");
    }

    #[test]
    fn strategy_changes_hash() {
        let plain = config_hash(None, None, None);
        let cookie = config_hash(Some(LbStrategy::Cookie), None, None);
        let random = config_hash(Some(LbStrategy::Random), None, None);
        assert_ne!(plain, cookie);
        assert_ne!(cookie, random);
        assert_eq!(cookie, config_hash(Some(LbStrategy::Cookie), None, None));
        assert_eq!(cookie.len(), CONFIG_HASH_LEN);
    }

    #[test]
    fn health_check_and_validation_change_hash() {
        let hc = HealthCheckSpec { path: "/healthz".into(), ..Default::default() };
        let other = HealthCheckSpec { path: "/ready".into(), ..Default::default() };
        assert_ne!(config_hash(None, Some(&hc), None), config_hash(None, Some(&other), None));
        assert_ne!(config_hash(None, Some(&hc), None), config_hash(None, None, None));

        let uv = UpstreamValidation { ca_certificate: b"ca".to_vec(), subject_name: "backend".into() };
        let uv2 = UpstreamValidation { ca_certificate: b"ca".to_vec(), subject_name: "other".into() };
        assert_ne!(config_hash(None, None, Some(&uv)), config_hash(None, None, Some(&uv2)));
    }

    #[test]
    fn short_names_are_untouched() {
        assert_eq!(hashname(60, &["default", "kuard", "80", "da39a3ee5e"]), "default/kuard/80/da39a3ee5e");
    }

    #[test]
    fn long_names_are_shortened_deterministically() {
        let parts = [
            "it-is-a-truth-universally-acknowledged-that-a-single-man-in-possession",
            "must-be-in-want-of-a-wife",
            "80",
            "da39a3ee5e",
        ];
        let name = hashname(60, &parts);
        assert!(name.len() < 60, "{} is too long", name);
        assert!(name.starts_with("it-is-a-t"));
        assert!(name.ends_with("/80/da39a3ee5e"));
        assert_eq!(name, hashname(60, &parts));

        let other = hashname(60, &[parts[0], "must-be-in-want-of-a-husband", "80", "da39a3ee5e"]);
        assert_ne!(name, other);
    }
}
