//! Locator resolution over a set of relays.
//!
//! This crate provides:
//! - One-shot relay transport: fetch-until-EOSE queries and acknowledged
//!   publishes
//! - Gossip relay discovery from self-published relay lists
//! - The resolution engine: verify, decrypt, parse, freshness
//! - Deterministic endpoint selection with fingerprint pinning
//! - Interfaces for external collaborators (onion provisioning, legacy
//!   records, config persistence, network probing)

mod error;
mod external;
mod gossip;
mod message;
mod resolver;
mod selector;
mod transport;

pub use error::{ResolveError, Result};
pub use external::{
    ConfigStore, NetworkProbe, OnionEndpoint, OnionProvisioner, ServiceRecord,
    ServiceRecordResolver,
};
pub use gossip::discover_relays;
pub use message::{ClientMessage, Filter, MessageError, RelayMessage};
pub use resolver::{Recipients, ResolveOptions, Resolver, ResolverConfig};
pub use selector::{
    choose, decide, is_secure_scheme, EndpointDecision, EndpointSource, RejectReason, Selection,
    SelectorOptions,
};
pub use transport::{fetch_events, generate_subscription_id, publish_event, PublishConfirmation};
