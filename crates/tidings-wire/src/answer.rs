//! Answers to queries

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tidings_core::{BrokerError, BrokerResult, Message, QueryId, Rumor};

use crate::{jsonrpc_version, MessagesByChannel, JSONRPC_VERSION};

/// `error` member of a failed answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub description: String,
}

impl ErrorBody {
    pub fn into_error(self) -> BrokerError {
        BrokerError::from_code(self.code, self.description)
    }
}

impl From<&BrokerError> for ErrorBody {
    fn from(err: &BrokerError) -> Self {
        ErrorBody {
            code: err.code(),
            description: err.to_string(),
        }
    }
}

/// Answer envelope: `{jsonrpc, id, result | error}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<QueryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Answer {
    /// Successful answer carrying `result`
    pub fn ok(id: Option<QueryId>, result: Value) -> Self {
        Answer {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Successful answer with the conventional `0` result
    pub fn zero(id: Option<QueryId>) -> Self {
        Self::ok(id, Value::from(0))
    }

    /// Failed answer
    pub fn error(id: Option<QueryId>, err: &BrokerError) -> Self {
        Answer {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(err.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The answer as a result, the error body converted back to a `BrokerError`
    pub fn into_result(self) -> BrokerResult<Value> {
        match (self.error, self.result) {
            (Some(body), _) => Err(body.into_error()),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(BrokerError::InvalidMessageField(
                "answer has neither result nor error".to_string(),
            )),
        }
    }

    /// Result of a `get_messages_by_id` query
    pub fn messages_by_channel(self) -> BrokerResult<MessagesByChannel> {
        decode_result(self, "get_messages_by_id")
    }

    /// Result of a `catchup` query
    pub fn messages(self) -> BrokerResult<Vec<Message>> {
        decode_result(self, "catchup")
    }

    /// Result of a `rumor_state` query
    pub fn rumors(self) -> BrokerResult<Vec<Rumor>> {
        decode_result(self, "rumor_state")
    }

    /// Serialize to a single JSON document
    pub fn to_bytes(&self) -> BrokerResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| BrokerError::Internal(format!("failed to marshal answer: {e}")))
    }
}

fn decode_result<T: for<'de> Deserialize<'de>>(answer: Answer, what: &str) -> BrokerResult<T> {
    let value = answer.into_result()?;
    serde_json::from_value(value).map_err(|e| {
        BrokerError::InvalidMessageField(format!("invalid {what} result: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_answer_shape() {
        let err = BrokerError::InvalidResource("channel /root/x does not exist".into());
        let bytes = Answer::error(Some(4), &err).to_bytes().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["id"], 4);
        assert_eq!(value["error"]["code"], -2);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_zero_result() {
        let value = serde_json::to_value(Answer::zero(Some(1))).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 1, "result": 0}));
    }

    #[test]
    fn test_error_body_back_to_error() {
        let answer: Answer = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -3, "description": "exists"}
        }))
        .unwrap();
        assert_eq!(
            answer.into_result().unwrap_err(),
            BrokerError::DuplicateResource("exists".into())
        );
    }

    #[test]
    fn test_messages_by_channel_result() {
        let answer = Answer::ok(
            Some(9),
            json!({"/root/lao": [{
                "data": "ZA==", "sender": "cw==", "signature": "cw==", "message_id": "aQ=="
            }]}),
        );
        let result = answer.messages_by_channel().unwrap();
        assert_eq!(result["/root/lao"].len(), 1);
    }
}
