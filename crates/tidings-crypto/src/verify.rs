//! Message signing and verification
//!
//! Every ingress path runs `verify_message` before anything is stored.

use tidings_core::{BrokerError, BrokerResult, Message};

use crate::{decode_base64, encode_base64, message_id, Identity, PublicIdentity};

/// Check the signature and content id of a message
///
/// Decode failures and bad signatures are `InvalidMessageField`; a
/// message id that does not match its content is `InvalidAction`.
pub fn verify_message(msg: &Message) -> BrokerResult<()> {
    let data = decode_base64("data", &msg.data)?;
    let sender = PublicIdentity::from_base64(&msg.sender)?;
    let raw_signature = decode_base64("signature", &msg.signature)?;

    let signature: [u8; 64] = raw_signature.as_slice().try_into().map_err(|_| {
        BrokerError::InvalidMessageField(format!(
            "signature has {} bytes, expected 64",
            raw_signature.len()
        ))
    })?;

    if !sender.verify(&data, &signature) {
        tracing::debug!(message_id = %msg.message_id, "signature mismatch");
        return Err(BrokerError::InvalidMessageField(
            "failed to verify signature".to_string(),
        ));
    }

    let expected = message_id(&msg.data, &msg.signature)?;
    if expected != msg.message_id {
        return Err(BrokerError::InvalidAction(format!(
            "message id {} does not match content, expected {}",
            msg.message_id, expected
        )));
    }

    Ok(())
}

/// Build a signed message carrying `data`
pub fn sign_message(identity: &Identity, data: &[u8]) -> BrokerResult<Message> {
    let encoded = encode_base64(data);
    let signature = encode_base64(identity.sign(data));
    let id = message_id(&encoded, &signature)?;
    Ok(Message::new(encoded, identity.public_key(), signature, id))
}
