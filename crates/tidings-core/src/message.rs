//! Signed message definitions
//!
//! A message is the unit of the append-only log. Its fields travel as
//! base64url strings exactly as the client produced them; the id is a hash
//! over the encoded `data` and `signature` strings, so a message is stored
//! and forwarded byte-for-byte without re-encoding.

use serde::{Deserialize, Serialize};

use crate::MessageId;

/// Signature of a witness over a message id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessSignature {
    /// Witness public key (base64url)
    pub witness: String,
    /// Signature over the message id (base64url)
    pub signature: String,
}

/// Content-addressed signed message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Base64url payload
    pub data: String,
    /// Base64url public key of the author
    pub sender: String,
    /// Base64url signature of the decoded payload
    pub signature: String,
    /// Hash(data, signature)
    pub message_id: MessageId,
    /// Co-signatures collected from witnesses
    #[serde(default)]
    pub witness_signatures: Vec<WitnessSignature>,
}

impl Message {
    /// Create a message from already-encoded fields
    pub fn new(
        data: impl Into<String>,
        sender: impl Into<String>,
        signature: impl Into<String>,
        message_id: MessageId,
    ) -> Self {
        Message {
            data: data.into(),
            sender: sender.into(),
            signature: signature.into(),
            message_id,
            witness_signatures: Vec::new(),
        }
    }

    /// Attach witness signatures
    pub fn with_witnesses(mut self, witnesses: Vec<WitnessSignature>) -> Self {
        self.witness_signatures = witnesses;
        self
    }

    #[inline]
    pub fn id(&self) -> &MessageId {
        &self.message_id
    }
}
