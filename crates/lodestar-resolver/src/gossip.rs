//! Gossip relay discovery
//!
//! Before the main locator query, the resolver can expand its relay set
//! with the target identity's self-published relay list. Discovered URLs
//! are used for the current resolution only and never persisted. Any
//! failure degrades to the bootstrap set.

use crate::message::Filter;
use crate::transport;
use futures::future::join_all;
use lodestar::{relay_urls, sort_events, verify_event, Event, RELAY_LIST_KIND};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Expand the bootstrap relay set with the target's relay-list record.
///
/// Queries every bootstrap relay in parallel, keeps relay-list events
/// whose signature verifies and whose author is the target, and unions
/// the newest list's URLs into the bootstrap set without duplicates.
pub async fn discover_relays(
    target_pubkey: &str,
    bootstrap: &[String],
    wait: Duration,
    limit: u64,
) -> Vec<String> {
    let filter = Filter::new()
        .kinds(vec![RELAY_LIST_KIND])
        .authors(vec![target_pubkey.to_string()])
        .limit(limit);
    let filters = vec![filter];

    let queries = bootstrap
        .iter()
        .map(|url| transport::fetch_events(url, &filters, wait));
    let results = join_all(queries).await;

    let mut candidates: Vec<Event> = Vec::new();
    for (url, result) in bootstrap.iter().zip(results) {
        match result {
            Ok(events) => candidates.extend(events),
            Err(e) => {
                warn!("Gossip query against {} failed: {}", url, e);
            }
        }
    }

    candidates.retain(|event| {
        event.pubkey.eq_ignore_ascii_case(target_pubkey)
            && matches!(verify_event(event), Ok(true))
    });
    sort_events(&mut candidates);

    let mut seen: HashSet<String> = HashSet::new();
    let mut relays = Vec::new();
    for url in bootstrap {
        if seen.insert(url.clone()) {
            relays.push(url.clone());
        }
    }

    if let Some(newest) = candidates.first() {
        for url in relay_urls(newest) {
            if seen.insert(url.clone()) {
                debug!("Gossip discovered relay {} for {}", url, target_pubkey);
                relays.push(url);
            }
        }
    }

    relays
}
