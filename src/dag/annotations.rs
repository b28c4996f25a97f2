//! Annotation keys and the policy values derived from them.
//!
//! Every parser here is total: a value that cannot be understood falls back to
//! a fixed default instead of rejecting the object.

use std::time::Duration;

use crate::config::TranslatorConfig;
use crate::objects::ObjectMeta;

use super::{RetryPolicy, TimeoutPolicy};

/// Product ingress class key, wins over [`LEGACY_INGRESS_CLASS`].
pub const INGRESS_CLASS: &str = "routeplane.io/ingress.class";
pub const LEGACY_INGRESS_CLASS: &str = "kubernetes.io/ingress.class";

pub const REQUEST_TIMEOUT: &str = "routeplane.io/request-timeout";
pub const RETRY_ON: &str = "routeplane.io/retry-on";
pub const NUM_RETRIES: &str = "routeplane.io/num-retries";
pub const PER_TRY_TIMEOUT: &str = "routeplane.io/per-try-timeout";
pub const WEBSOCKET_ROUTES: &str = "routeplane.io/websocket-routes";
pub const FORCE_SSL_REDIRECT: &str = "ingress.kubernetes.io/force-ssl-redirect";

/// Retry condition applied when only a count or per-try timeout is given.
pub const DEFAULT_RETRY_ON: &str = "5xx";

/// The ingress class an object asks for, if any.
pub fn ingress_class(meta: &ObjectMeta) -> Option<&str> {
    meta.annotation(INGRESS_CLASS).or_else(|| meta.annotation(LEGACY_INGRESS_CLASS))
}

/// Whether an object takes part in builds under `config`.
pub fn matches_ingress_class(meta: &ObjectMeta, config: &TranslatorConfig) -> bool {
    match ingress_class(meta) {
        Some(class) => class.trim() == config.effective_ingress_class(),
        None => !config.has_custom_ingress_class(),
    }
}

/// Parse a timeout. Missing, empty, zero and unparseable values all mean
/// "no timeout", which is encoded as [`Duration::ZERO`].
pub fn parse_timeout(raw: Option<&str>) -> Duration {
    match raw.map(str::trim) {
        None | Some("") => Duration::ZERO,
        Some(value) => humantime::parse_duration(value).unwrap_or(Duration::ZERO),
    }
}

/// `routeplane.io/request-timeout`, when present.
pub fn request_timeout(meta: &ObjectMeta) -> Option<TimeoutPolicy> {
    meta.annotation(REQUEST_TIMEOUT).map(|raw| TimeoutPolicy { request: parse_timeout(Some(raw)) })
}

/// Retry policy from the retry annotations, when any of them is present.
pub fn retry_policy(meta: &ObjectMeta) -> Option<RetryPolicy> {
    let retry_on = meta.annotation(RETRY_ON).map(str::trim).filter(|v| !v.is_empty());
    let num_retries = meta.annotation(NUM_RETRIES);
    let per_try = meta.annotation(PER_TRY_TIMEOUT);

    if retry_on.is_none() && num_retries.is_none() && per_try.is_none() {
        return None;
    }

    Some(RetryPolicy {
        retry_on: retry_on.unwrap_or(DEFAULT_RETRY_ON).to_string(),
        num_retries: num_retries.and_then(|raw| raw.trim().parse().ok()).unwrap_or(0),
        per_try_timeout: parse_timeout(per_try),
    })
}

/// Prefixes listed in `routeplane.io/websocket-routes`.
pub fn websocket_routes(meta: &ObjectMeta) -> Vec<String> {
    meta.annotation(WEBSOCKET_ROUTES)
        .map(|raw| {
            raw.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `ingress.kubernetes.io/force-ssl-redirect: "true"`
pub fn force_ssl_redirect(meta: &ObjectMeta) -> bool {
    meta.annotation(FORCE_SSL_REDIRECT).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}
