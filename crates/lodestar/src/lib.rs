//! Core types for signed endpoint-locator records.
//!
//! This crate provides:
//! - Signed events: serialization, Schnorr signing, verification, canonical
//!   newest-first ordering
//! - Locator payload codec: endpoints, TTL freshness window, hard expiry
//! - Recipient crypto: public, direct, and multi-recipient wrapped content
//! - Relay lists for gossip discovery

mod event;
mod locator;
mod relay_list;
mod seal;

// Signed events
pub use event::{
    Event, EventError, EventTemplate, UnsignedEvent, finalize_event, generate_secret_key,
    get_event_hash, get_public_key, get_public_key_hex, serialize_event, sort_events,
    validate_event, validate_unsigned_event, verify_event,
};

// Locator records
pub use locator::{
    AddressFamily, EXPIRATION_TAG, Endpoint, IDENTIFIER_TAG, LOCATOR_KIND, LocatorPayload, build,
    effective_expiry, expiration_tag, get_expiration, get_identifier, identifier_tag, is_fresh,
    parse,
};

// Recipient crypto
pub use seal::{
    LocatorContent, NONCE_SIZE, SESSION_KEY_SIZE, SealError, WrappedContent, classify,
    conversation_key, open, open_content, seal, seal_direct, seal_wrapped,
};

// Relay lists
pub use relay_list::{RELAY_LIST_KIND, RELAY_TAG, is_relay_list, relay_tags, relay_urls};
