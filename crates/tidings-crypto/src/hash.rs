//! Content hashing
//!
//! Each argument is fed to SHA-256 as its decimal byte length followed by
//! the string itself, so `("ab", "c")` and `("a", "bc")` never collide.

use sha2::{Digest, Sha256};

use tidings_core::{BrokerError, BrokerResult, MessageId};

use crate::encode_base64;

/// Length-prefixed SHA-256 over `parts`, base64url encoded
pub fn hash(parts: &[&str]) -> BrokerResult<String> {
    let mut hasher = Sha256::new();
    for part in parts {
        if part.is_empty() {
            return Err(BrokerError::InvalidMessageField(
                "cannot hash an empty string".to_string(),
            ));
        }
        hasher.update(part.len().to_string().as_bytes());
        hasher.update(part.as_bytes());
    }
    Ok(encode_base64(hasher.finalize()))
}

/// Id of a message: Hash(data, signature) over the encoded fields
pub fn message_id(data: &str, signature: &str) -> BrokerResult<MessageId> {
    hash(&[data, signature]).map(MessageId::new)
}
