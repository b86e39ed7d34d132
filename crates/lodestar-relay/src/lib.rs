//! WebSocket relay for signed events.
//!
//! This crate provides:
//! - An in-memory event store with kind, author, and tag indexes
//! - Subscription filters and per-connection subscription management
//! - A WebSocket server speaking the JSON-array protocol
//!   (EVENT/REQ/CLOSE in, OK/EVENT/EOSE/NOTICE out)

mod error;
mod server;
mod store;
mod subscription;
mod validation;

pub use error::{RelayError, Result};
pub use server::{RelayConfig, RelayServer};
pub use store::{EventStore, StoreConfig, StoreOutcome, StoredEvent};
pub use subscription::{Filter, Subscription, SubscriptionManager};
pub use validation::{validate_event, validate_subscription_id, MAX_SUBSCRIPTION_ID_LEN};
