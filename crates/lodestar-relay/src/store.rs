//! In-memory event storage
//!
//! Stores signed events keyed by id with secondary indexes on kind,
//! author, and tag (name, value) pairs. Storage is append-only; queries
//! union per-filter matches and return them newest-first.

use crate::subscription::Filter;
use lodestar::{sort_events, Event};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Events returned per filter when no limit is given
    pub default_query_limit: usize,
    /// Hard cap on any per-filter limit
    pub max_query_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_query_limit: 500,
            max_query_limit: 5000,
        }
    }
}

/// Result of attempting to store an event
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOutcome {
    /// The event id the outcome refers to
    pub id: String,
    /// Whether the relay accepts the event
    pub accepted: bool,
    /// Whether the event was freshly stored (false for duplicates)
    pub stored: bool,
    /// Store sequence assigned on a fresh store
    pub seq: Option<u64>,
    /// Machine-readable message for the OK reply
    pub message: String,
}

/// An event paired with its store sequence, as fanned out to connection
/// tasks over the broadcast channel.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    /// Sequence assigned when the event was stored
    pub seq: u64,
    /// The stored event
    pub event: Event,
}

/// In-memory event store with kind, author, and tag indexes
#[derive(Debug, Default)]
pub struct EventStore {
    config: StoreConfig,
    last_seq: u64,
    events: HashMap<String, Event>,
    by_kind: HashMap<u16, Vec<String>>,
    by_author: HashMap<String, Vec<String>>,
    by_tag: HashMap<(String, String), Vec<String>>,
}

impl EventStore {
    /// Create a store with default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with the given configuration
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            last_seq: 0,
            events: HashMap::new(),
            by_kind: HashMap::new(),
            by_author: HashMap::new(),
            by_tag: HashMap::new(),
        }
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sequence of the most recently stored event. Taken together with a
    /// `query`, this is a consistent snapshot of the store.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Store an event.
    ///
    /// A duplicate id is accepted but not stored again, and must not
    /// trigger a second broadcast.
    pub fn add(&mut self, event: &Event) -> StoreOutcome {
        if event.id.is_empty() || event.pubkey.is_empty() {
            return StoreOutcome {
                id: event.id.clone(),
                accepted: false,
                stored: false,
                seq: None,
                message: "invalid: missing id or pubkey".to_string(),
            };
        }

        if self.events.contains_key(&event.id) {
            debug!("Duplicate event: {}", event.id);
            return StoreOutcome {
                id: event.id.clone(),
                accepted: true,
                stored: false,
                seq: None,
                message: "duplicate: already have this event".to_string(),
            };
        }

        self.by_kind
            .entry(event.kind)
            .or_default()
            .push(event.id.clone());
        self.by_author
            .entry(event.pubkey.clone())
            .or_default()
            .push(event.id.clone());
        for tag in &event.tags {
            if tag.len() >= 2 {
                self.by_tag
                    .entry((tag[0].clone(), tag[1].clone()))
                    .or_default()
                    .push(event.id.clone());
            }
        }
        self.events.insert(event.id.clone(), event.clone());
        self.last_seq += 1;

        StoreOutcome {
            id: event.id.clone(),
            accepted: true,
            stored: true,
            seq: Some(self.last_seq),
            message: String::new(),
        }
    }

    /// Get an event by id
    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.get(id)
    }

    /// Query events matching any of the given filters.
    ///
    /// An empty filter list returns every stored event. Per-filter limits
    /// apply after newest-first sorting; the union is deduplicated by id
    /// and returned newest-first.
    pub fn query(&self, filters: &[Filter]) -> Vec<Event> {
        if filters.is_empty() {
            let mut all: Vec<Event> = self.events.values().cloned().collect();
            sort_events(&mut all);
            return all;
        }

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for filter in filters {
            let mut matched: Vec<Event> = self
                .events
                .values()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect();
            sort_events(&mut matched);

            let limit = filter
                .limit
                .unwrap_or(self.config.default_query_limit)
                .min(self.config.max_query_limit);
            matched.truncate(limit);

            for event in matched {
                if seen.insert(event.id.clone()) {
                    results.push(event);
                }
            }
        }

        sort_events(&mut results);
        results
    }
}
