//! External collaborator interfaces
//!
//! Resolution consumes a few services the core deliberately does not
//! implement: onion-service provisioning, the legacy single-endpoint
//! record system, configuration persistence, and public-address probing.
//! Each is a narrow async trait so callers can plug in real clients or
//! test doubles.

use crate::error::Result;
use async_trait::async_trait;

/// A legacy single-endpoint service record, used as a fallback when no
/// fresh locator exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    /// Dial URL
    pub endpoint: String,
    /// Pinned transport credential, if the record carries one
    pub fingerprint: Option<String>,
    /// Hard expiry (unix seconds), if declared
    pub expiry: Option<u64>,
    /// Id of the carrying event
    pub event_id: String,
    /// Author of the record
    pub pubkey: String,
}

/// An onion service provisioned for a local port.
#[derive(Debug, Clone, PartialEq)]
pub struct OnionEndpoint {
    /// Onion address (without scheme)
    pub address: String,
    /// Port the service is exposed on
    pub service_port: u16,
}

/// Provisions onion services through an external controller.
#[async_trait]
pub trait OnionProvisioner: Send + Sync {
    /// Create or reuse an onion service forwarding to `local_port`.
    async fn provision(&self, local_port: u16) -> Result<OnionEndpoint>;
}

/// Resolves legacy service records for an identity.
#[async_trait]
pub trait ServiceRecordResolver: Send + Sync {
    /// The current legacy record for the identity, if one exists.
    async fn lookup(&self, pubkey: &str) -> Result<Option<ServiceRecord>>;
}

/// Key-value persistence for service configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Probes the local host's publicly reachable addresses.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Public IPv4 address, if reachable.
    async fn public_ipv4(&self) -> Result<Option<String>>;
    /// Public IPv6 address, if reachable.
    async fn public_ipv6(&self) -> Result<Option<String>>;
}
