//! Event and subscription validation
//!
//! Error messages are prefixed with `invalid: ` so they can be sent
//! verbatim in OK and NOTICE replies.

use crate::error::{RelayError, Result};
use lodestar::Event;

/// Maximum subscription ID length
pub const MAX_SUBSCRIPTION_ID_LEN: usize = 64;

/// Validate an event's structure and cryptography: hex field shapes,
/// id commitment, and signature.
pub fn validate_event(event: &Event) -> Result<()> {
    match lodestar::verify_event(event) {
        Ok(true) => Ok(()),
        Ok(false) => Err(RelayError::Validation(
            "signature verification failed".to_string(),
        )),
        Err(e) => Err(RelayError::Validation(e.to_string())),
    }
}

/// Validate a subscription ID: non-empty, at most 64 characters.
pub fn validate_subscription_id(sub_id: &str) -> Result<()> {
    if sub_id.is_empty() {
        return Err(RelayError::Validation(
            "subscription ID must not be empty".to_string(),
        ));
    }
    if sub_id.len() > MAX_SUBSCRIPTION_ID_LEN {
        return Err(RelayError::Validation(format!(
            "subscription ID too long (max {} chars)",
            MAX_SUBSCRIPTION_ID_LEN
        )));
    }
    Ok(())
}
