//! Endpoint-locator payload codec and freshness model.
//!
//! A locator record is an addressable event (one per identity + identifier)
//! whose content carries a [`LocatorPayload`]: a TTL window, an update
//! timestamp, and the list of reachable endpoints. The carrying event may
//! additionally declare a hard expiry via the `expiration` tag; the
//! effective expiry is the earlier of the two.

use crate::event::Event;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Event kind for endpoint-locator records (addressable, `d`-tag identifier).
pub const LOCATOR_KIND: u16 = 30058;

/// Tag carrying the record identifier.
pub const IDENTIFIER_TAG: &str = "d";

/// Tag carrying an optional hard expiry (unix seconds).
pub const EXPIRATION_TAG: &str = "expiration";

/// Transport-address class of an endpoint, used for preference ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
    Onion,
}

/// A single reachable endpoint advertised by a locator record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Dial URL
    pub url: String,
    /// Transport scheme (wss, ws, https, ...)
    pub protocol: String,
    /// Address family, for onion/ipv6/ipv4 preference ordering
    #[serde(default)]
    pub family: AddressFamily,
    /// Lower values are preferred
    #[serde(default)]
    pub priority: i32,
    /// Pinned transport credential (certificate key hash) for secure schemes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

/// The decoded locator payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorPayload {
    /// Freshness window in seconds; must be positive for the payload to
    /// ever be considered fresh
    #[serde(default)]
    pub ttl: i64,
    /// Unix timestamp (seconds) of the last update
    #[serde(default)]
    pub updated_at: u64,
    /// Advertised endpoints
    pub endpoints: Vec<Endpoint>,
}

/// Build a locator payload.
pub fn build(endpoints: Vec<Endpoint>, ttl: i64, updated_at: u64) -> LocatorPayload {
    LocatorPayload {
        ttl,
        updated_at,
        endpoints,
    }
}

/// Parse a locator payload from plaintext content.
///
/// Returns `None` on invalid JSON, non-object content, or a missing or
/// non-list `endpoints` field.
pub fn parse(content: &str) -> Option<LocatorPayload> {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            debug!("locator content is not JSON: {}", e);
            return None;
        }
    };
    if !value.is_object() {
        return None;
    }
    if !value.get("endpoints").map(|e| e.is_array()).unwrap_or(false) {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Check whether a payload is inside its TTL window.
///
/// A non-positive `ttl` can never be fresh. `allow_stale` otherwise
/// short-circuits the window check.
pub fn is_fresh(payload: &LocatorPayload, now: u64, allow_stale: bool) -> bool {
    if payload.ttl <= 0 {
        return false;
    }
    if allow_stale {
        return true;
    }
    now <= payload.updated_at.saturating_add(payload.ttl as u64)
}

/// Effective hard expiry: the earlier of the TTL window end and the
/// carrying event's `expiration` tag, whichever are present.
pub fn effective_expiry(payload: &LocatorPayload, tag_expiry: Option<u64>) -> Option<u64> {
    let window_end = if payload.ttl > 0 {
        Some(payload.updated_at.saturating_add(payload.ttl as u64))
    } else {
        None
    };
    match (window_end, tag_expiry) {
        (Some(w), Some(t)) => Some(w.min(t)),
        (Some(w), None) => Some(w),
        (None, Some(t)) => Some(t),
        (None, None) => None,
    }
}

/// Record identifier (`d` tag) of a locator event.
pub fn get_identifier(event: &Event) -> Option<&str> {
    event.tag_value(IDENTIFIER_TAG)
}

/// Hard expiry (`expiration` tag) of an event, if declared and parseable.
pub fn get_expiration(event: &Event) -> Option<u64> {
    event.tag_value(EXPIRATION_TAG)?.parse().ok()
}

/// Build the identifier tag for a locator event.
pub fn identifier_tag(record_id: &str) -> Vec<String> {
    vec![IDENTIFIER_TAG.to_string(), record_id.to_string()]
}

/// Build the hard-expiry tag for a locator event.
pub fn expiration_tag(at: u64) -> Vec<String> {
    vec![EXPIRATION_TAG.to_string(), at.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_endpoint() -> Endpoint {
        Endpoint {
            url: "wss://relay.example.com".to_string(),
            protocol: "wss".to_string(),
            family: AddressFamily::Ipv4,
            priority: 1,
            k: Some("K1".to_string()),
        }
    }

    #[test]
    fn test_build_and_parse_roundtrip() {
        let payload = build(vec![sample_endpoint()], 600, 1700000000);
        let json = serde_json::to_string(&payload).unwrap();
        let parsed = parse(&json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(parse("not json at all").is_none());
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(parse("[1,2,3]").is_none());
        assert!(parse("\"a string\"").is_none());
    }

    #[test]
    fn test_parse_rejects_missing_endpoints() {
        assert!(parse(r#"{"ttl":60,"updated_at":100}"#).is_none());
        assert!(parse(r#"{"ttl":60,"updated_at":100,"endpoints":"nope"}"#).is_none());
    }

    #[test]
    fn test_parse_defaults() {
        let payload = parse(r#"{"endpoints":[{"url":"wss://a","protocol":"wss"}]}"#).unwrap();
        assert_eq!(payload.ttl, 0);
        assert_eq!(payload.updated_at, 0);
        assert_eq!(payload.endpoints[0].family, AddressFamily::Ipv4);
        assert_eq!(payload.endpoints[0].priority, 0);
        assert_eq!(payload.endpoints[0].k, None);
    }

    #[test]
    fn test_freshness_window_boundaries() {
        let payload = build(vec![sample_endpoint()], 60, 1000);
        assert!(is_fresh(&payload, 1059, false));
        assert!(is_fresh(&payload, 1060, false));
        assert!(!is_fresh(&payload, 1061, false));
    }

    #[test]
    fn test_freshness_non_positive_ttl() {
        let payload = build(vec![sample_endpoint()], 0, 1000);
        assert!(!is_fresh(&payload, 1000, false));
        // ttl <= 0 can never be fresh, even when stale payloads are allowed
        assert!(!is_fresh(&payload, 1000, true));

        let negative = build(vec![sample_endpoint()], -5, 1000);
        assert!(!is_fresh(&negative, 1000, false));
    }

    #[test]
    fn test_freshness_allow_stale() {
        let payload = build(vec![sample_endpoint()], 60, 1000);
        assert!(is_fresh(&payload, 99999, true));
    }

    #[test]
    fn test_effective_expiry_takes_minimum() {
        let payload = build(vec![sample_endpoint()], 600, 1000);
        assert_eq!(effective_expiry(&payload, None), Some(1600));
        assert_eq!(effective_expiry(&payload, Some(1200)), Some(1200));
        assert_eq!(effective_expiry(&payload, Some(9000)), Some(1600));

        let no_window = build(vec![sample_endpoint()], 0, 1000);
        assert_eq!(effective_expiry(&no_window, Some(1200)), Some(1200));
        assert_eq!(effective_expiry(&no_window, None), None);
    }

    #[test]
    fn test_expiration_tag_parsing() {
        let event = Event {
            id: "a".repeat(64),
            pubkey: "b".repeat(64),
            created_at: 0,
            kind: LOCATOR_KIND,
            tags: vec![
                identifier_tag("svc"),
                expiration_tag(1700000123),
            ],
            content: String::new(),
            sig: "c".repeat(128),
        };

        assert_eq!(get_identifier(&event), Some("svc"));
        assert_eq!(get_expiration(&event), Some(1700000123));
    }

    #[test]
    fn test_expiration_tag_garbage_value() {
        let event = Event {
            id: "a".repeat(64),
            pubkey: "b".repeat(64),
            created_at: 0,
            kind: LOCATOR_KIND,
            tags: vec![vec![EXPIRATION_TAG.to_string(), "soon".to_string()]],
            content: String::new(),
            sig: "c".repeat(128),
        };

        assert_eq!(get_expiration(&event), None);
    }
}
