//! Relay-list events for gossip discovery.
//!
//! An identity advertises the relays it publishes to with a replaceable
//! relay-list event: one `r` tag per relay URL. Resolvers union these
//! lists into the set of relays worth querying for that identity.

use crate::event::Event;

/// Event kind for relay-list announcements (replaceable).
pub const RELAY_LIST_KIND: u16 = 10002;

/// Tag carrying a relay URL.
pub const RELAY_TAG: &str = "r";

/// Whether an event is a relay-list announcement.
pub fn is_relay_list(event: &Event) -> bool {
    event.kind == RELAY_LIST_KIND
}

/// Extract relay URLs from a relay-list event.
///
/// Preserves tag order, drops duplicates and malformed tags.
pub fn relay_urls(event: &Event) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for tag in &event.tags {
        if tag.len() >= 2 && tag[0] == RELAY_TAG && !tag[1].is_empty() {
            if seen.insert(tag[1].clone()) {
                urls.push(tag[1].clone());
            }
        }
    }
    urls
}

/// Build the tags of a relay-list event from a set of relay URLs.
pub fn relay_tags(urls: &[String]) -> Vec<Vec<String>> {
    urls.iter()
        .map(|u| vec![RELAY_TAG.to_string(), u.clone()])
        .collect()
}
