//! Tidings Crypto - Identities, hashing and message verification
//!
//! Provides the cryptographic primitives of the broker:
//! - Identity management (Ed25519)
//! - Length-prefixed SHA-256 content hashing
//! - Message signing and verification

pub mod hash;
pub mod identity;
pub mod verify;

pub use hash::*;
pub use identity::*;
pub use verify::*;

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use tidings_core::{BrokerError, BrokerResult};

/// Encode bytes as padded base64url, the encoding of every wire field
#[inline]
pub fn encode_base64(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE.encode(bytes)
}

/// Decode a padded base64url field, naming it in the error
pub fn decode_base64(field: &str, value: &str) -> BrokerResult<Vec<u8>> {
    URL_SAFE
        .decode(value)
        .map_err(|e| BrokerError::InvalidMessageField(format!("failed to decode {field}: {e}")))
}
