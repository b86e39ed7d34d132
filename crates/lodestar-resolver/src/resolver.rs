//! Locator resolution
//!
//! `resolve` answers "where is this identity reachable right now":
//! optionally expand the relay set via gossip, query every relay in
//! parallel for the identity's locator record, verify, decrypt, parse,
//! and check freshness. "No usable record" is `Ok(None)`; errors are
//! reserved for bad arguments, a fully unreachable relay set, and
//! corrupted records addressed to the caller.

use crate::error::{ResolveError, Result};
use crate::gossip;
use crate::message::Filter;
use crate::transport::{self, PublishConfirmation};
use futures::future::join_all;
use lodestar::{
    expiration_tag, finalize_event, get_expiration, identifier_tag, is_fresh, open_content, parse,
    seal_direct, seal_wrapped, sort_events, verify_event, Event, EventTemplate, LocatorPayload,
    LOCATOR_KIND,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Bootstrap relay URLs
    pub relays: Vec<String>,
    /// Timeout per relay query
    pub query_timeout: Duration,
    /// Timeout for the gossip pre-step
    pub gossip_timeout: Duration,
    /// Per-filter event limit sent to relays
    pub query_limit: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            query_timeout: Duration::from_secs(5),
            gossip_timeout: Duration::from_secs(5),
            query_limit: 10,
        }
    }
}

/// Per-call resolution options
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Reject stale payloads instead of returning them with a warning
    pub strict: bool,
    /// Expand the relay set via the target's relay-list record first
    pub gossip: bool,
}

/// Who a published locator payload is readable by
#[derive(Debug, Clone)]
pub enum Recipients {
    /// Plaintext, readable by anyone
    Public,
    /// Sealed for exactly one recipient pubkey
    Direct(String),
    /// Sealed for a list of recipient pubkeys
    Wrapped(Vec<String>),
}

/// Locator resolver over a set of relays
pub struct Resolver {
    config: ResolverConfig,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn is_hex_pubkey(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl Resolver {
    /// Create a resolver
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve the locator payload for an identity.
    ///
    /// `secret_key` is only needed for direct or wrapped records; public
    /// records resolve without it. Returns `Ok(None)` when no verified,
    /// decryptable, parseable record exists, and in strict mode also when
    /// the newest record is past its freshness window.
    pub async fn resolve(
        &self,
        target_pubkey: &str,
        secret_key: Option<&[u8; 32]>,
        record_id: &str,
        opts: ResolveOptions,
    ) -> Result<Option<LocatorPayload>> {
        if !is_hex_pubkey(target_pubkey) {
            return Err(ResolveError::Argument(format!(
                "target pubkey must be 64 hex chars, got {:?}",
                target_pubkey
            )));
        }
        if self.config.relays.is_empty() {
            return Err(ResolveError::Argument("no relays configured".to_string()));
        }

        let relays = if opts.gossip {
            gossip::discover_relays(
                target_pubkey,
                &self.config.relays,
                self.config.gossip_timeout,
                self.config.query_limit,
            )
            .await
        } else {
            self.config.relays.clone()
        };

        let filter = Filter::new()
            .kinds(vec![LOCATOR_KIND])
            .authors(vec![target_pubkey.to_string()])
            .identifier(record_id)
            .limit(self.config.query_limit);
        let filters = vec![filter];

        let queries = relays
            .iter()
            .map(|url| transport::fetch_events(url, &filters, self.config.query_timeout));
        let results = join_all(queries).await;

        let mut candidates: Vec<Event> = Vec::new();
        let mut first_error: Option<ResolveError> = None;
        let mut any_reachable = false;
        for (url, result) in relays.iter().zip(results) {
            match result {
                Ok(events) => {
                    any_reachable = true;
                    candidates.extend(events);
                }
                Err(e) => {
                    warn!("Relay {} failed: {}", url, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if !any_reachable {
            // Could not even ask: distinct from "no usable record"
            return Err(first_error.unwrap_or_else(|| {
                ResolveError::Protocol("no relays responded".to_string())
            }));
        }

        candidates.retain(|event| {
            event.pubkey.eq_ignore_ascii_case(target_pubkey)
                && matches!(verify_event(event), Ok(true))
        });
        sort_events(&mut candidates);

        let newest = match candidates.first() {
            Some(e) => e,
            None => {
                debug!("No locator record for {}/{}", target_pubkey, record_id);
                return Ok(None);
            }
        };

        let plaintext = match open_content(&newest.content, &newest.pubkey, secret_key)? {
            Some(p) => p,
            None => {
                debug!(
                    "Locator record {} is not addressed to this identity",
                    newest.id
                );
                return Ok(None);
            }
        };

        let payload = match parse(&plaintext) {
            Some(p) => p,
            None => {
                debug!("Locator record {} has unparseable payload", newest.id);
                return Ok(None);
            }
        };

        let now = unix_now();
        let within_expiry = lodestar::effective_expiry(&payload, get_expiration(newest))
            .map_or(true, |expiry| now <= expiry);
        if !is_fresh(&payload, now, false) || !within_expiry {
            if opts.strict {
                return Ok(None);
            }
            warn!(
                "Locator for {}/{} is past its freshness window, returning it anyway",
                target_pubkey, record_id
            );
        }

        Ok(Some(payload))
    }

    /// Publish a locator payload under the caller's identity.
    ///
    /// Publishes to every configured relay in parallel; succeeds if at
    /// least one relay accepts the event.
    pub async fn publish_locator(
        &self,
        secret_key: &[u8; 32],
        record_id: &str,
        payload: &LocatorPayload,
        recipients: Recipients,
        expires_at: Option<u64>,
    ) -> Result<Event> {
        if self.config.relays.is_empty() {
            return Err(ResolveError::Argument("no relays configured".to_string()));
        }

        let plaintext = serde_json::to_string(payload)?;
        let content = match recipients {
            Recipients::Public => plaintext,
            Recipients::Direct(recipient) => seal_direct(secret_key, &recipient, &plaintext)?,
            Recipients::Wrapped(recipients) => {
                serde_json::to_string(&seal_wrapped(secret_key, &recipients, &plaintext)?)?
            }
        };

        let mut tags = vec![identifier_tag(record_id)];
        if let Some(at) = expires_at {
            tags.push(expiration_tag(at));
        }

        let template = EventTemplate {
            created_at: unix_now(),
            kind: LOCATOR_KIND,
            tags,
            content,
        };
        let event = finalize_event(&template, secret_key)?;

        let publishes = self
            .config
            .relays
            .iter()
            .map(|url| transport::publish_event(url, &event, self.config.query_timeout));
        let results = join_all(publishes).await;

        let mut accepted = false;
        let mut last_rejection = String::new();
        for (url, result) in self.config.relays.iter().zip(results) {
            match result {
                Ok(PublishConfirmation {
                    accepted: true, ..
                }) => {
                    info!("Relay {} accepted locator {}", url, event.id);
                    accepted = true;
                }
                Ok(PublishConfirmation { message, .. }) => {
                    warn!("Relay {} rejected locator {}: {}", url, event.id, message);
                    last_rejection = message;
                }
                Err(e) => {
                    warn!("Publish to {} failed: {}", url, e);
                    last_rejection = e.to_string();
                }
            }
        }

        if accepted {
            Ok(event)
        } else {
            Err(ResolveError::PublishFailed(last_rejection))
        }
    }
}
