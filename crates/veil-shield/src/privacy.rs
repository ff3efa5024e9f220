//! Request Privacy Helpers
//!
//! Small helpers for the host's request hooks: detect click-tracking
//! query parameters and scrub identifying request headers.

use hyper::header::{HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

/// Query parameters used purely for click/campaign tracking
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "gclsrc",
    "dclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "yclid",
    "twclid",
    "_ga",
    "_gl",
    "_hsenc",
    "_hsmi",
    "vero_id",
    "mkt_tok",
];

/// Headers that identify the browser installation
const IDENTIFYING_HEADERS: &[&str] = &["x-client-data"];

/// User-Agent sent in place of the embedded engine's own
pub const GENERIC_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Whether `url` carries any known tracking parameter. Malformed URLs carry none.
pub fn has_tracking_params(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    parsed
        .query_pairs()
        .any(|(key, _)| TRACKING_PARAMS.contains(&&*key))
}

/// Remove identifying headers and replace the User-Agent with a generic one
pub fn sanitize_request_headers(headers: &mut HeaderMap) {
    for name in IDENTIFYING_HEADERS {
        headers.remove(*name);
    }
    headers.insert(USER_AGENT, HeaderValue::from_static(GENERIC_USER_AGENT));
}
