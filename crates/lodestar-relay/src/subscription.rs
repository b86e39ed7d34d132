//! Subscription management and event filtering
//!
//! Manages client subscriptions and filters events. Filters support:
//! ids, authors, kinds, tags, since, until, and limit.

use lodestar::Event;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Subscription filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Filter {
    /// List of event IDs (exact, case-insensitive hex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// List of author pubkeys (exact, case-insensitive hex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// List of event kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Generic tag filters (e.g., "#d" for record identifiers)
    #[serde(flatten)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, Vec<String>>>,

    /// Events must be at or after this (Unix timestamp, inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Events must be at or before this (Unix timestamp, inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Maximum number of events to return
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

fn any_matches_hex(candidates: &[String], value: &str) -> bool {
    candidates.iter().any(|c| c.eq_ignore_ascii_case(value))
}

impl Filter {
    /// Create a new empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref ids) = self.ids {
            if !any_matches_hex(ids, &event.id) {
                return false;
            }
        }

        if let Some(ref authors) = self.authors {
            if !any_matches_hex(authors, &event.pubkey) {
                return false;
            }
        }

        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }

        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }

        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }

        if let Some(ref tag_filters) = self.tags {
            for (tag_name, tag_values) in tag_filters {
                // Tag filters are in the format "#d": ["record-id"]
                let tag_key = tag_name.trim_start_matches('#');

                let has_matching_tag = event.tags.iter().any(|event_tag| {
                    if event_tag.is_empty() || event_tag[0] != tag_key {
                        return false;
                    }
                    // An empty value list matches any tag with this name
                    if tag_values.is_empty() {
                        return true;
                    }
                    if event_tag.len() < 2 {
                        return false;
                    }
                    tag_values.iter().any(|v| v == &event_tag[1])
                });

                if !has_matching_tag {
                    return false;
                }
            }
        }

        true
    }
}

/// A client subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Subscription ID
    pub id: String,

    /// Filters for this subscription
    pub filters: Vec<Filter>,

    /// Store sequence at subscription time. Live events at or below it
    /// were already served as backlog and must not be delivered again.
    pub after_seq: u64,
}

impl Subscription {
    /// Create a new subscription
    pub fn new(id: String, filters: Vec<Filter>) -> Self {
        Self {
            id,
            filters,
            after_seq: 0,
        }
    }

    /// Check if an event matches any filter in this subscription
    pub fn matches(&self, event: &Event) -> bool {
        self.filters.iter().any(|filter| filter.matches(event))
    }
}

/// Manages all subscriptions for a connection
#[derive(Debug, Default, Clone)]
pub struct SubscriptionManager {
    subscriptions: HashMap<String, Subscription>,
}

impl SubscriptionManager {
    /// Create a new subscription manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription, replacing one with the same ID
    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Remove a subscription
    pub fn remove(&mut self, subscription_id: &str) -> bool {
        self.subscriptions.remove(subscription_id).is_some()
    }

    /// Get a subscription by ID
    pub fn get(&self, subscription_id: &str) -> Option<&Subscription> {
        self.subscriptions.get(subscription_id)
    }

    /// IDs of all subscriptions matching an event stored at `seq`.
    /// Subscriptions whose backlog snapshot already covered `seq` are
    /// skipped.
    pub fn matches_any(&self, event: &Event, seq: u64) -> Vec<String> {
        self.subscriptions
            .values()
            .filter(|sub| sub.after_seq < seq && sub.matches(event))
            .map(|sub| sub.id.clone())
            .collect()
    }

    /// Get number of subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if there are no subscriptions
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event(kind: u16, created_at: u64, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: "ab".repeat(32),
            pubkey: "cd".repeat(32),
            created_at,
            kind,
            tags,
            content: "test".to_string(),
            sig: "ef".repeat(64),
        }
    }

    #[test]
    fn test_filter_kinds() {
        let filter = Filter {
            kinds: Some(vec![30058, 10002]),
            ..Default::default()
        };

        assert!(filter.matches(&test_event(30058, 100, vec![])));
        assert!(!filter.matches(&test_event(1, 100, vec![])));
    }

    #[test]
    fn test_filter_ids_exact_case_insensitive() {
        let event = test_event(1, 100, vec![]);

        let exact = Filter {
            ids: Some(vec!["ab".repeat(32)]),
            ..Default::default()
        };
        assert!(exact.matches(&event));

        let upper = Filter {
            ids: Some(vec!["AB".repeat(32)]),
            ..Default::default()
        };
        assert!(upper.matches(&event));

        // A prefix is not an exact match
        let prefix = Filter {
            ids: Some(vec!["abab".to_string()]),
            ..Default::default()
        };
        assert!(!prefix.matches(&event));
    }

    #[test]
    fn test_filter_authors_exact_case_insensitive() {
        let event = test_event(1, 100, vec![]);

        let filter = Filter {
            authors: Some(vec!["CD".repeat(32)]),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        let prefix = Filter {
            authors: Some(vec!["cdcd".to_string()]),
            ..Default::default()
        };
        assert!(!prefix.matches(&event));
    }

    #[test]
    fn test_filter_since_until_inclusive() {
        let event = test_event(1, 100, vec![]);

        let filter = Filter {
            since: Some(100),
            until: Some(100),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        let too_late = Filter {
            since: Some(101),
            ..Default::default()
        };
        assert!(!too_late.matches(&event));

        let too_early = Filter {
            until: Some(99),
            ..Default::default()
        };
        assert!(!too_early.matches(&event));
    }

    #[test]
    fn test_filter_tags() {
        let event = test_event(
            30058,
            100,
            vec![vec!["d".to_string(), "svc-main".to_string()]],
        );

        let mut tags = HashMap::new();
        tags.insert("#d".to_string(), vec!["svc-main".to_string()]);
        let filter = Filter {
            tags: Some(tags),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        let mut other = HashMap::new();
        other.insert("#d".to_string(), vec!["other".to_string()]);
        let no_match = Filter {
            tags: Some(other),
            ..Default::default()
        };
        assert!(!no_match.matches(&event));
    }

    #[test]
    fn test_filter_tag_empty_values_match_presence() {
        let event = test_event(
            30058,
            100,
            vec![vec!["d".to_string(), "svc-main".to_string()]],
        );

        let mut tags = HashMap::new();
        tags.insert("#d".to_string(), vec![]);
        let filter = Filter {
            tags: Some(tags),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        let mut absent = HashMap::new();
        absent.insert("#p".to_string(), vec![]);
        let no_match = Filter {
            tags: Some(absent),
            ..Default::default()
        };
        assert!(!no_match.matches(&event));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::new();
        assert!(filter.matches(&test_event(1, 100, vec![])));
    }

    #[test]
    fn test_subscription_matches_any_filter() {
        let sub = Subscription::new(
            "sub1".to_string(),
            vec![
                Filter {
                    kinds: Some(vec![1]),
                    ..Default::default()
                },
                Filter {
                    kinds: Some(vec![30058]),
                    ..Default::default()
                },
            ],
        );

        assert!(sub.matches(&test_event(30058, 100, vec![])));
        assert!(!sub.matches(&test_event(2, 100, vec![])));
    }

    #[test]
    fn test_subscription_manager_replaces_same_id() {
        let mut manager = SubscriptionManager::new();
        manager.add(Subscription::new(
            "sub1".to_string(),
            vec![Filter {
                kinds: Some(vec![1]),
                ..Default::default()
            }],
        ));
        manager.add(Subscription::new(
            "sub1".to_string(),
            vec![Filter {
                kinds: Some(vec![30058]),
                ..Default::default()
            }],
        ));

        assert_eq!(manager.len(), 1);
        let matching = manager.matches_any(&test_event(30058, 100, vec![]), 1);
        assert_eq!(matching, vec!["sub1"]);
        assert!(manager.matches_any(&test_event(1, 100, vec![]), 1).is_empty());

        assert!(manager.remove("sub1"));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_matches_any_skips_events_at_or_before_snapshot() {
        let mut manager = SubscriptionManager::new();
        let mut sub = Subscription::new("sub1".to_string(), vec![]);
        sub.after_seq = 5;
        manager.add(sub);

        let event = test_event(1, 100, vec![]);
        // Sequence 5 was covered by the backlog snapshot
        assert!(manager.matches_any(&event, 5).is_empty());
        assert_eq!(manager.matches_any(&event, 6), vec!["sub1"]);
    }
}
