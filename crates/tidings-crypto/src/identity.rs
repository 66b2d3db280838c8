//! Identity management using Ed25519
//!
//! Public keys travel as padded base64url strings; that string is also the
//! server id used in rumors and vector clocks.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use tidings_core::{BrokerError, BrokerResult};

use crate::{decode_base64, encode_base64};

/// Signing keypair of a server or client
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    public_key: String,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create identity from existing signing key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let public_key = encode_base64(verifying_key.as_bytes());
        Identity {
            signing_key,
            verifying_key,
            public_key,
        }
    }

    /// Get the signing key bytes (secret)
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Get the verifying key bytes (public)
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Base64url public key
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Sign a payload
    pub fn sign(&self, payload: &[u8]) -> [u8; 64] {
        self.signing_key.sign(payload).to_bytes()
    }

    /// Verification half of this identity
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity {
            verifying_key: self.verifying_key,
            public_key: self.public_key.clone(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Public identity for verification only
#[derive(Clone)]
pub struct PublicIdentity {
    verifying_key: VerifyingKey,
    public_key: String,
}

impl PublicIdentity {
    /// Create from verifying key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes).ok()?;
        Some(PublicIdentity {
            verifying_key,
            public_key: encode_base64(bytes),
        })
    }

    /// Parse a base64url public key as sent on the wire
    pub fn from_base64(public_key: &str) -> BrokerResult<Self> {
        let raw = decode_base64("public key", public_key)?;
        let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            BrokerError::InvalidMessageField(format!(
                "public key has {} bytes, expected 32",
                raw.len()
            ))
        })?;
        Self::from_bytes(&bytes).ok_or_else(|| {
            BrokerError::InvalidMessageField("public key is not a valid ed25519 point".to_string())
        })
    }

    /// Base64url public key
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Verify a signature
    pub fn verify(&self, payload: &[u8], signature: &[u8; 64]) -> bool {
        let sig = Signature::from_bytes(signature);
        self.verifying_key.verify(payload, &sig).is_ok()
    }

    /// Get the verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }
}

impl std::fmt::Debug for PublicIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicIdentity")
            .field("public_key", &self.public_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_generation() {
        let id1 = Identity::generate();
        let id2 = Identity::generate();

        assert_ne!(id1.public_key(), id2.public_key());
    }

    #[test]
    fn test_sign_verify() {
        let identity = Identity::generate();
        let payload = b"hello tidings";

        let signature = identity.sign(payload);
        assert!(identity.public().verify(payload, &signature));
        assert!(!identity.public().verify(b"wrong payload", &signature));
    }

    #[test]
    fn test_public_identity_from_base64() {
        let identity = Identity::generate();
        let public = PublicIdentity::from_base64(identity.public_key()).unwrap();

        assert_eq!(public.to_bytes(), identity.verifying_key_bytes());
        assert_eq!(public.public_key(), identity.public_key());
    }

    #[test]
    fn test_public_identity_rejects_short_key() {
        let err = PublicIdentity::from_base64(&encode_base64([1u8; 16])).unwrap_err();
        assert_eq!(err.code(), -4);
        assert!(PublicIdentity::from_base64("***").is_err());
    }

    #[test]
    fn test_identity_roundtrip() {
        let identity = Identity::generate();
        let restored = Identity::from_bytes(&identity.signing_key_bytes());

        assert_eq!(identity.public_key(), restored.public_key());
    }
}
