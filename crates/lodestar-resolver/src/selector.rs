//! Deterministic endpoint selection
//!
//! Given the endpoints of a locator payload, pick one candidate: filter
//! by allowed protocols, honor onion preference, then lowest priority
//! with stable order on ties. The chosen candidate still has to pass the
//! security gate: secure schemes require a pinned fingerprint, and a
//! configured expected fingerprint must match.

use crate::external::ServiceRecord;
use lodestar::{AddressFamily, Endpoint, LocatorPayload};
use tracing::debug;

/// Selection options
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    /// Prefer onion-family endpoints regardless of priority
    pub tor_preferred: bool,
    /// Fingerprint the chosen endpoint must present, if pinned
    pub expected_k: Option<String>,
    /// Protocols eligible for selection
    pub allowed_protocols: Vec<String>,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            tor_preferred: false,
            expected_k: None,
            allowed_protocols: vec!["wss".to_string(), "ws".to_string()],
        }
    }
}

/// Why no endpoint was selected
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// No candidate survived protocol filtering
    NoEndpoint,
    /// A secure scheme was chosen but the endpoint pins no fingerprint
    MissingFingerprint,
    /// The endpoint's fingerprint differs from the configured one
    FingerprintMismatch { expected: String, actual: String },
}

impl RejectReason {
    /// Stable label for logs and callers
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::NoEndpoint => "no-endpoint",
            RejectReason::MissingFingerprint => "missing-k",
            RejectReason::FingerprintMismatch { .. } => "k-mismatch",
        }
    }
}

/// Result of endpoint selection
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// The accepted endpoint, if any
    pub endpoint: Option<Endpoint>,
    /// Why selection failed, when `endpoint` is none
    pub reason: Option<RejectReason>,
}

/// Whether a protocol counts as secure and therefore requires a pinned
/// fingerprint.
pub fn is_secure_scheme(protocol: &str) -> bool {
    matches!(protocol, "wss" | "https" | "tls" | "tcps") || protocol.ends_with('s')
}

/// Choose an endpoint from a candidate list.
pub fn choose(endpoints: &[Endpoint], opts: &SelectorOptions) -> Selection {
    let candidates: Vec<&Endpoint> = endpoints
        .iter()
        .filter(|e| opts.allowed_protocols.iter().any(|p| p == &e.protocol))
        .collect();

    if candidates.is_empty() {
        return Selection {
            endpoint: None,
            reason: Some(RejectReason::NoEndpoint),
        };
    }

    let chosen = if opts.tor_preferred {
        candidates
            .iter()
            .find(|e| e.family == AddressFamily::Onion)
            .copied()
    } else {
        None
    };
    // Strict less-than keeps the first candidate on priority ties
    let chosen = match chosen {
        Some(onion) => onion,
        None => {
            let mut best = candidates[0];
            for &e in &candidates[1..] {
                if e.priority < best.priority {
                    best = e;
                }
            }
            best
        }
    };

    if is_secure_scheme(&chosen.protocol) {
        let actual = match &chosen.k {
            Some(k) => k,
            None => {
                return Selection {
                    endpoint: None,
                    reason: Some(RejectReason::MissingFingerprint),
                }
            }
        };
        if let Some(expected) = &opts.expected_k {
            if expected != actual {
                return Selection {
                    endpoint: None,
                    reason: Some(RejectReason::FingerprintMismatch {
                        expected: expected.clone(),
                        actual: actual.clone(),
                    }),
                };
            }
        }
    }

    Selection {
        endpoint: Some(chosen.clone()),
        reason: None,
    }
}

/// Where a decided endpoint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    /// Fresh locator record
    Locator,
    /// Legacy service record fallback
    Legacy,
    /// No endpoint could be decided
    None,
}

impl EndpointSource {
    /// Stable label for logs and callers
    pub fn label(&self) -> &'static str {
        match self {
            EndpointSource::Locator => "locator",
            EndpointSource::Legacy => "ncc02",
            EndpointSource::None => "none",
        }
    }
}

/// The top-level endpoint decision for a resolved identity
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDecision {
    /// Dial URL, if one was accepted
    pub url: Option<String>,
    /// Fingerprint of the accepted endpoint, if pinned
    pub fingerprint: Option<String>,
    /// Which record supplied the endpoint
    pub source: EndpointSource,
    /// Rejection or fallback label, when relevant
    pub reason: Option<String>,
    /// Event id of the record the decision was based on
    pub evidence: Option<String>,
}

fn scheme_of(url: &str) -> &str {
    url.split_once("://").map(|(s, _)| s).unwrap_or("")
}

/// Combine a locator payload and an optional legacy record into one
/// endpoint decision.
///
/// The locator is passed together with the id of its carrying event,
/// which the decision reports as evidence. A fresh locator whose
/// selector candidate passes the security gate wins. Otherwise the
/// legacy record is used as a fallback, unless it is a secure endpoint
/// whose fingerprint differs from the pinned one, in which case the
/// decision is an outright rejection.
pub fn decide(
    locator: Option<(&LocatorPayload, &str)>,
    legacy: Option<&ServiceRecord>,
    opts: &SelectorOptions,
) -> EndpointDecision {
    if let Some((payload, event_id)) = locator {
        let selection = choose(&payload.endpoints, opts);
        match selection.endpoint {
            Some(endpoint) => {
                return EndpointDecision {
                    url: Some(endpoint.url),
                    fingerprint: endpoint.k,
                    source: EndpointSource::Locator,
                    reason: None,
                    evidence: Some(event_id.to_string()),
                };
            }
            None => {
                if let Some(reason) = &selection.reason {
                    debug!("Locator {} rejected: {}", event_id, reason.label());
                }
            }
        }
    }

    if let Some(record) = legacy {
        if is_secure_scheme(scheme_of(&record.endpoint)) {
            if let Some(expected) = &opts.expected_k {
                if record.fingerprint.as_ref() != Some(expected) {
                    // Never silently accept an unverified secure endpoint
                    return EndpointDecision {
                        url: None,
                        fingerprint: None,
                        source: EndpointSource::Legacy,
                        reason: Some(RejectReason::FingerprintMismatch {
                            expected: expected.clone(),
                            actual: record.fingerprint.clone().unwrap_or_default(),
                        }
                        .label()
                        .to_string()),
                        evidence: Some(record.event_id.clone()),
                    };
                }
            }
        }
        return EndpointDecision {
            url: Some(record.endpoint.clone()),
            fingerprint: record.fingerprint.clone(),
            source: EndpointSource::Legacy,
            reason: Some("fallback".to_string()),
            evidence: Some(record.event_id.clone()),
        };
    }

    EndpointDecision {
        url: None,
        fingerprint: None,
        source: EndpointSource::None,
        reason: Some(RejectReason::NoEndpoint.label().to_string()),
        evidence: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar::build;

    fn endpoint(url: &str, protocol: &str, family: AddressFamily, priority: i32, k: Option<&str>) -> Endpoint {
        Endpoint {
            url: url.to_string(),
            protocol: protocol.to_string(),
            family,
            priority,
            k: k.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_choose_lowest_priority() {
        let endpoints = vec![
            endpoint("wss://b", "wss", AddressFamily::Ipv4, 2, Some("K1")),
            endpoint("wss://a", "wss", AddressFamily::Ipv4, 1, Some("K1")),
        ];
        let selection = choose(&endpoints, &SelectorOptions::default());
        assert_eq!(selection.endpoint.unwrap().url, "wss://a");
    }

    #[test]
    fn test_choose_stable_on_priority_ties() {
        let endpoints = vec![
            endpoint("wss://first", "wss", AddressFamily::Ipv4, 1, Some("K1")),
            endpoint("wss://second", "wss", AddressFamily::Ipv4, 1, Some("K1")),
        ];
        let selection = choose(&endpoints, &SelectorOptions::default());
        assert_eq!(selection.endpoint.unwrap().url, "wss://first");
    }

    #[test]
    fn test_choose_filters_protocols() {
        let endpoints = vec![endpoint("https://a", "https", AddressFamily::Ipv4, 0, Some("K1"))];
        let selection = choose(&endpoints, &SelectorOptions::default());
        assert_eq!(selection.endpoint, None);
        assert_eq!(selection.reason, Some(RejectReason::NoEndpoint));
    }

    #[test]
    fn test_choose_tor_preferred_beats_priority() {
        let endpoints = vec![
            endpoint("ws://onion.onion", "ws", AddressFamily::Onion, 9, None),
            endpoint("wss://fast", "wss", AddressFamily::Ipv4, 1, Some("K1")),
        ];
        let opts = SelectorOptions {
            tor_preferred: true,
            ..Default::default()
        };
        let selection = choose(&endpoints, &opts);
        assert_eq!(selection.endpoint.unwrap().url, "ws://onion.onion");
    }

    #[test]
    fn test_choose_tor_preferred_without_onion_falls_back() {
        let endpoints = vec![endpoint("wss://a", "wss", AddressFamily::Ipv4, 1, Some("K1"))];
        let opts = SelectorOptions {
            tor_preferred: true,
            ..Default::default()
        };
        let selection = choose(&endpoints, &opts);
        assert_eq!(selection.endpoint.unwrap().url, "wss://a");
    }

    #[test]
    fn test_secure_scheme_requires_fingerprint() {
        let endpoints = vec![endpoint("wss://a", "wss", AddressFamily::Ipv4, 1, None)];
        let selection = choose(&endpoints, &SelectorOptions::default());
        assert_eq!(selection.reason, Some(RejectReason::MissingFingerprint));
        assert_eq!(selection.reason.unwrap().label(), "missing-k");
    }

    #[test]
    fn test_insecure_scheme_needs_no_fingerprint() {
        let endpoints = vec![endpoint("ws://a", "ws", AddressFamily::Ipv4, 1, None)];
        let selection = choose(&endpoints, &SelectorOptions::default());
        assert!(selection.endpoint.is_some());
    }

    #[test]
    fn test_fingerprint_mismatch_carries_both_values() {
        let endpoints = vec![endpoint("wss://a", "wss", AddressFamily::Ipv4, 1, Some("Y"))];
        let opts = SelectorOptions {
            expected_k: Some("X".to_string()),
            ..Default::default()
        };
        let selection = choose(&endpoints, &opts);
        assert_eq!(
            selection.reason,
            Some(RejectReason::FingerprintMismatch {
                expected: "X".to_string(),
                actual: "Y".to_string(),
            })
        );
        assert_eq!(selection.reason.unwrap().label(), "k-mismatch");
    }

    #[test]
    fn test_is_secure_scheme() {
        assert!(is_secure_scheme("wss"));
        assert!(is_secure_scheme("https"));
        assert!(is_secure_scheme("tls"));
        assert!(is_secure_scheme("tcps"));
        assert!(!is_secure_scheme("ws"));
        assert!(!is_secure_scheme("http"));
        assert!(!is_secure_scheme("tcp"));
    }

    fn legacy_record(endpoint: &str, fingerprint: Option<&str>) -> ServiceRecord {
        ServiceRecord {
            endpoint: endpoint.to_string(),
            fingerprint: fingerprint.map(|s| s.to_string()),
            expiry: None,
            event_id: "e1".to_string(),
            pubkey: "p1".to_string(),
        }
    }

    #[test]
    fn test_decide_prefers_fresh_locator() {
        let payload = build(
            vec![endpoint("wss://loc", "wss", AddressFamily::Ipv4, 1, Some("K1"))],
            600,
            1000,
        );
        let legacy = legacy_record("wss://old", Some("K1"));

        let decision = decide(
            Some((&payload, "locator-event")),
            Some(&legacy),
            &SelectorOptions::default(),
        );
        assert_eq!(decision.url.as_deref(), Some("wss://loc"));
        assert_eq!(decision.source, EndpointSource::Locator);
        assert_eq!(decision.reason, None);
        assert_eq!(decision.evidence.as_deref(), Some("locator-event"));
    }

    #[test]
    fn test_decide_falls_back_to_legacy() {
        let legacy = legacy_record("ws://old", None);
        let decision = decide(None, Some(&legacy), &SelectorOptions::default());
        assert_eq!(decision.url.as_deref(), Some("ws://old"));
        assert_eq!(decision.source, EndpointSource::Legacy);
        assert_eq!(decision.source.label(), "ncc02");
        assert_eq!(decision.reason.as_deref(), Some("fallback"));
        assert_eq!(decision.evidence.as_deref(), Some("e1"));
    }

    #[test]
    fn test_decide_rejected_locator_falls_back() {
        // Locator candidate fails the fingerprint gate
        let payload = build(
            vec![endpoint("wss://loc", "wss", AddressFamily::Ipv4, 1, Some("K1"))],
            600,
            1000,
        );
        let legacy = legacy_record("wss://old", Some("K2"));
        let opts = SelectorOptions {
            expected_k: Some("K2".to_string()),
            ..Default::default()
        };

        let decision = decide(Some((&payload, "locator-event")), Some(&legacy), &opts);
        assert_eq!(decision.url.as_deref(), Some("wss://old"));
        assert_eq!(decision.source, EndpointSource::Legacy);
        // The fallback record supplies the evidence, not the rejected locator
        assert_eq!(decision.evidence.as_deref(), Some("e1"));
    }

    #[test]
    fn test_decide_rejects_unverified_secure_legacy() {
        let legacy = legacy_record("wss://old", Some("K9"));
        let opts = SelectorOptions {
            expected_k: Some("K1".to_string()),
            ..Default::default()
        };

        let decision = decide(None, Some(&legacy), &opts);
        assert_eq!(decision.url, None);
        assert_eq!(decision.source, EndpointSource::Legacy);
        assert_eq!(decision.reason.as_deref(), Some("k-mismatch"));
        assert_eq!(decision.evidence.as_deref(), Some("e1"));
    }

    #[test]
    fn test_decide_accepts_secure_legacy_without_pin() {
        // No expected fingerprint configured: nothing to verify against
        let legacy = legacy_record("wss://old", Some("K9"));
        let decision = decide(None, Some(&legacy), &SelectorOptions::default());
        assert_eq!(decision.url.as_deref(), Some("wss://old"));
    }

    #[test]
    fn test_decide_nothing_available() {
        let decision = decide(None, None, &SelectorOptions::default());
        assert_eq!(decision.url, None);
        assert_eq!(decision.source, EndpointSource::None);
        assert_eq!(decision.reason.as_deref(), Some("no-endpoint"));
        assert_eq!(decision.evidence, None);
    }
}
