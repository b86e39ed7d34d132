//! Recipient crypto for locator content.
//!
//! Locator content comes in three encodings, detected structurally:
//!
//! 1. **Wrapped**: a JSON object with `ciphertext` and `wraps`, one payload
//!    sealed under a random session key, with that session key sealed once
//!    per recipient.
//! 2. **Public**: plain JSON, no decryption.
//! 3. **Direct**: opaque ciphertext sealed for a single recipient.
//!
//! Conversation keys are derived from a secp256k1 ECDH shared point via
//! HKDF-SHA256; the AEAD is XChaCha20-Poly1305 with a random 24-byte nonce
//! prepended to the ciphertext, base64 encoded.

use crate::event::get_public_key_hex;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bitcoin::secp256k1::{ecdh, Parity, PublicKey, SecretKey, XOnlyPublicKey};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;

/// HKDF salt binding conversation keys to this protocol.
const CONVERSATION_SALT: &[u8] = b"lodestar-conversation-v1";

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Size of a session key (32 bytes).
pub const SESSION_KEY_SIZE: usize = 32;

/// Errors that can occur during sealing operations.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("malformed sealed payload: {0}")]
    Malformed(String),
}

/// Multi-recipient wrapped content: one sealed payload plus a sealed copy
/// of the session key per recipient. Ephemeral; never persisted decrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedContent {
    /// Payload sealed under the session key's self conversation key
    pub ciphertext: String,
    /// recipient pubkey hex -> session key hex sealed for that recipient
    pub wraps: HashMap<String, String>,
}

/// Structural classification of locator content.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorContent {
    /// Plain JSON payload
    Public(String),
    /// Opaque single-recipient ciphertext
    Direct(String),
    /// Multi-recipient wrapped payload
    Wrapped(WrappedContent),
}

/// Classify content by structural inspection, in detection order:
/// wrapped (JSON object with `ciphertext` and `wraps`), then public
/// (any other valid JSON), then direct (everything else).
pub fn classify(content: &str) -> LocatorContent {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => {
            if value.get("ciphertext").is_some() && value.get("wraps").is_some() {
                if let Ok(wrapped) = serde_json::from_value::<WrappedContent>(value.clone()) {
                    return LocatorContent::Wrapped(wrapped);
                }
            }
            LocatorContent::Public(content.to_string())
        }
        Err(_) => LocatorContent::Direct(content.to_string()),
    }
}

/// Derive the conversation key for (secret key, peer public key).
///
/// The peer key is an x-only 32-byte hex string; the shared point's x
/// coordinate is run through HKDF-SHA256 extract with a fixed salt.
pub fn conversation_key(
    secret_key: &[u8; 32],
    peer_pubkey_hex: &str,
) -> Result<[u8; 32], SealError> {
    let sk = SecretKey::from_slice(secret_key).map_err(|e| SealError::InvalidKey(e.to_string()))?;
    let peer_bytes =
        hex::decode(peer_pubkey_hex).map_err(|e| SealError::InvalidKey(e.to_string()))?;
    let xonly =
        XOnlyPublicKey::from_slice(&peer_bytes).map_err(|e| SealError::InvalidKey(e.to_string()))?;
    let peer = PublicKey::from_x_only_public_key(xonly, Parity::Even);

    let point = ecdh::shared_secret_point(&peer, &sk);
    let (prk, _) = Hkdf::<Sha256>::extract(Some(CONVERSATION_SALT), &point[..32]);

    let mut key = [0u8; 32];
    key.copy_from_slice(&prk);
    Ok(key)
}

/// Seal plaintext under a symmetric key: base64(nonce || ciphertext).
pub fn seal(key: &[u8; 32], plaintext: &str) -> Result<String, SealError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|e| SealError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Open a sealed payload under a symmetric key.
pub fn open(key: &[u8; 32], sealed: &str) -> Result<String, SealError> {
    let bytes = BASE64
        .decode(sealed)
        .map_err(|e| SealError::Malformed(e.to_string()))?;
    if bytes.len() <= NONCE_SIZE {
        return Err(SealError::Malformed("sealed payload too short".to_string()));
    }

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let plaintext = cipher
        .decrypt(XNonce::from_slice(&bytes[..NONCE_SIZE]), &bytes[NONCE_SIZE..])
        .map_err(|e| SealError::Decryption(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| SealError::Decryption(e.to_string()))
}

/// Seal plaintext for exactly one recipient under the publisher's
/// conversation key with that recipient.
pub fn seal_direct(
    secret_key: &[u8; 32],
    recipient_pubkey_hex: &str,
    plaintext: &str,
) -> Result<String, SealError> {
    let key = conversation_key(secret_key, recipient_pubkey_hex)?;
    seal(&key, plaintext)
}

/// Seal plaintext for many recipients.
///
/// A random session key seals the payload once under its own self
/// conversation key; the session key hex is then sealed per recipient
/// under the publisher's conversation key with that recipient.
pub fn seal_wrapped(
    secret_key: &[u8; 32],
    recipient_pubkeys: &[String],
    plaintext: &str,
) -> Result<WrappedContent, SealError> {
    let mut session_key = [0u8; SESSION_KEY_SIZE];
    rand::rng().fill_bytes(&mut session_key);

    let session_pubkey =
        get_public_key_hex(&session_key).map_err(|e| SealError::InvalidKey(e.to_string()))?;
    let payload_key = conversation_key(&session_key, &session_pubkey)?;
    let ciphertext = seal(&payload_key, plaintext)?;

    let session_key_hex = hex::encode(session_key);
    let mut wraps = HashMap::new();
    for recipient in recipient_pubkeys {
        let wrap_key = conversation_key(secret_key, recipient)?;
        wraps.insert(recipient.to_lowercase(), seal(&wrap_key, &session_key_hex)?);
    }

    Ok(WrappedContent { ciphertext, wraps })
}

/// Recover the plaintext of locator content.
///
/// Returns `Ok(None)` for records that are simply not addressed to the
/// caller: public content passes through, a wrapped record without a wrap
/// for the local identity, a direct record without a local secret key, or
/// a direct record whose AEAD tag does not authenticate for the local
/// conversation key. Returns an error only when a wrapped record names the
/// local identity as a recipient but still fails to decrypt.
pub fn open_content(
    content: &str,
    publisher_pubkey_hex: &str,
    local_secret: Option<&[u8; 32]>,
) -> Result<Option<String>, SealError> {
    match classify(content) {
        LocatorContent::Public(json) => Ok(Some(json)),
        LocatorContent::Wrapped(wrapped) => {
            let secret = match local_secret {
                Some(s) => s,
                None => return Ok(None),
            };
            let local_pubkey =
                get_public_key_hex(secret).map_err(|e| SealError::InvalidKey(e.to_string()))?;

            let sealed_session = match wrapped.wraps.get(&local_pubkey) {
                Some(s) => s,
                None => return Ok(None),
            };

            // We are a named recipient: any failure from here on is corruption.
            let wrap_key = conversation_key(secret, publisher_pubkey_hex)?;
            let session_key_hex = open(&wrap_key, sealed_session)?;

            let session_bytes = hex::decode(&session_key_hex)
                .map_err(|e| SealError::Decryption(format!("invalid session key hex: {}", e)))?;
            let session_key: [u8; SESSION_KEY_SIZE] = session_bytes
                .try_into()
                .map_err(|_| SealError::Decryption("session key has wrong length".to_string()))?;

            let session_pubkey = get_public_key_hex(&session_key)
                .map_err(|e| SealError::Decryption(e.to_string()))?;
            let payload_key = conversation_key(&session_key, &session_pubkey)?;
            Ok(Some(open(&payload_key, &wrapped.ciphertext)?))
        }
        LocatorContent::Direct(ciphertext) => {
            let secret = match local_secret {
                Some(s) => s,
                None => return Ok(None),
            };
            let key = conversation_key(secret, publisher_pubkey_hex)?;
            match open(&key, &ciphertext) {
                Ok(plaintext) => Ok(Some(plaintext)),
                // Not addressed to us: the tag does not authenticate.
                Err(_) => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::generate_secret_key;

    #[test]
    fn test_classify_detection_order() {
        let wrapped = serde_json::json!({
            "ciphertext": "abc",
            "wraps": {"aa": "bb"}
        })
        .to_string();
        assert!(matches!(classify(&wrapped), LocatorContent::Wrapped(_)));

        let public = r#"{"ttl":60,"endpoints":[]}"#;
        assert!(matches!(classify(public), LocatorContent::Public(_)));

        let direct = "bm90IGpzb24gYXQgYWxs zzz";
        assert!(matches!(classify(direct), LocatorContent::Direct(_)));
    }

    #[test]
    fn test_classify_partial_wrap_shape_is_public() {
        // ciphertext without wraps is just a JSON object
        let content = r#"{"ciphertext":"abc"}"#;
        assert!(matches!(classify(content), LocatorContent::Public(_)));
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);

        let sealed = seal(&key, "the payload").unwrap();
        assert_eq!(open(&key, &sealed).unwrap(), "the payload");
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        let sealed = seal(&key, "the payload").unwrap();

        let mut other = [0u8; 32];
        rand::rng().fill_bytes(&mut other);
        assert!(open(&other, &sealed).is_err());
    }

    #[test]
    fn test_conversation_key_is_shared() {
        let a = generate_secret_key();
        let b = generate_secret_key();
        let a_pub = get_public_key_hex(&a).unwrap();
        let b_pub = get_public_key_hex(&b).unwrap();

        // Both sides derive the same key from their own secret and the
        // peer's public key.
        let ab = conversation_key(&a, &b_pub).unwrap();
        let ba = conversation_key(&b, &a_pub).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_direct_roundtrip() {
        let publisher = generate_secret_key();
        let recipient = generate_secret_key();
        let publisher_pub = get_public_key_hex(&publisher).unwrap();
        let recipient_pub = get_public_key_hex(&recipient).unwrap();

        let sealed = seal_direct(&publisher, &recipient_pub, r#"{"x":1}"#).unwrap();

        let plaintext = open_content(&sealed, &publisher_pub, Some(&recipient)).unwrap();
        assert_eq!(plaintext.as_deref(), Some(r#"{"x":1}"#));
    }

    #[test]
    fn test_direct_wrong_recipient_returns_none() {
        let publisher = generate_secret_key();
        let recipient = generate_secret_key();
        let stranger = generate_secret_key();
        let publisher_pub = get_public_key_hex(&publisher).unwrap();
        let recipient_pub = get_public_key_hex(&recipient).unwrap();

        let sealed = seal_direct(&publisher, &recipient_pub, r#"{"x":1}"#).unwrap();

        assert_eq!(
            open_content(&sealed, &publisher_pub, Some(&stranger)).unwrap(),
            None
        );
    }

    #[test]
    fn test_direct_without_secret_returns_none() {
        let publisher = generate_secret_key();
        let recipient = generate_secret_key();
        let publisher_pub = get_public_key_hex(&publisher).unwrap();
        let recipient_pub = get_public_key_hex(&recipient).unwrap();

        let sealed = seal_direct(&publisher, &recipient_pub, r#"{"x":1}"#).unwrap();

        assert_eq!(open_content(&sealed, &publisher_pub, None).unwrap(), None);
    }

    #[test]
    fn test_wrapped_decrypts_for_every_listed_recipient() {
        let publisher = generate_secret_key();
        let b = generate_secret_key();
        let c = generate_secret_key();
        let d = generate_secret_key();
        let publisher_pub = get_public_key_hex(&publisher).unwrap();
        let b_pub = get_public_key_hex(&b).unwrap();
        let c_pub = get_public_key_hex(&c).unwrap();

        let wrapped =
            seal_wrapped(&publisher, &[b_pub, c_pub], r#"{"secret":"payload"}"#).unwrap();
        let content = serde_json::to_string(&wrapped).unwrap();

        let for_b = open_content(&content, &publisher_pub, Some(&b)).unwrap();
        assert_eq!(for_b.as_deref(), Some(r#"{"secret":"payload"}"#));

        let for_c = open_content(&content, &publisher_pub, Some(&c)).unwrap();
        assert_eq!(for_c.as_deref(), Some(r#"{"secret":"payload"}"#));

        // An unrelated identity is simply not addressed.
        let for_d = open_content(&content, &publisher_pub, Some(&d)).unwrap();
        assert_eq!(for_d, None);
    }

    #[test]
    fn test_wrapped_corrupted_wrap_is_an_error() {
        let publisher = generate_secret_key();
        let b = generate_secret_key();
        let publisher_pub = get_public_key_hex(&publisher).unwrap();
        let b_pub = get_public_key_hex(&b).unwrap();

        let mut wrapped = seal_wrapped(&publisher, &[b_pub.clone()], r#"{"x":1}"#).unwrap();
        wrapped
            .wraps
            .insert(b_pub, seal(&[7u8; 32], "garbage").unwrap());
        let content = serde_json::to_string(&wrapped).unwrap();

        // We are listed as a recipient but the wrap is unusable.
        assert!(open_content(&content, &publisher_pub, Some(&b)).is_err());
    }

    #[test]
    fn test_public_content_passes_through() {
        let payload = r#"{"ttl":600,"endpoints":[]}"#;
        let out = open_content(payload, &"a".repeat(64), None).unwrap();
        assert_eq!(out.as_deref(), Some(payload));
    }
}
