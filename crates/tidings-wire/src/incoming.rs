//! Classification of inbound payloads

use serde_json::Value;

use tidings_core::{BrokerError, BrokerResult};

use crate::{Answer, QueryEnvelope};

/// A decoded inbound JSON-RPC document
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    Query(QueryEnvelope),
    Answer(Answer),
}

impl Incoming {
    /// Classify `bytes`: a query has `method`, an answer `result` or `error`
    pub fn parse(bytes: &[u8]) -> BrokerResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(ref object) = value else {
            return Err(BrokerError::InvalidMessageField(
                "jsonrpc payload is not an object".to_string(),
            ));
        };

        if object.contains_key("method") {
            Ok(Incoming::Query(serde_json::from_value(value)?))
        } else if object.contains_key("result") || object.contains_key("error") {
            Ok(Incoming::Answer(serde_json::from_value(value)?))
        } else {
            Err(BrokerError::InvalidMessageField(
                "jsonrpc payload is neither a query nor an answer".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{broadcast, Method};
    use tidings_crypto::{sign_message, Identity};

    #[test]
    fn test_query_classified() {
        let bytes = br#"{"jsonrpc":"2.0","id":3,"method":"subscribe","params":{"channel":"/root/a"}}"#;
        let Incoming::Query(envelope) = Incoming::parse(bytes).unwrap() else {
            panic!("expected query");
        };
        assert_eq!(envelope.id, Some(3));
        assert_eq!(envelope.method, "subscribe");
    }

    #[test]
    fn test_answer_classified() {
        let bytes = br#"{"jsonrpc":"2.0","id":3,"result":0}"#;
        assert!(matches!(Incoming::parse(bytes).unwrap(), Incoming::Answer(_)));
    }

    #[test]
    fn test_neither_is_rejected() {
        for bytes in [&br#"{"jsonrpc":"2.0","id":3}"#[..], b"[1,2]", b"{not json"] {
            assert_eq!(Incoming::parse(bytes).unwrap_err().code(), -4);
        }
    }

    #[test]
    fn test_broadcast_reparses() {
        let msg = sign_message(&Identity::generate(), b"hello").unwrap();
        let bytes = broadcast("/root/lao", &msg).unwrap();
        let Incoming::Query(envelope) = Incoming::parse(&bytes).unwrap() else {
            panic!("expected query");
        };
        let Method::Broadcast(params) = envelope.decode().unwrap() else {
            panic!("expected broadcast");
        };
        assert_eq!(params.message, msg);
    }
}
