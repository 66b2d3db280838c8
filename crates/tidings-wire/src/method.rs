//! Query methods and their parameters

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tidings_core::{
    BrokerError, BrokerResult, Message, MessageId, QueryId, Rumor, RumorTimestamp, ServerInfo,
};

use crate::{jsonrpc_version, JSONRPC_VERSION};

/// Message ids per channel, the body of `heartbeat` and `get_messages_by_id`
pub type IdsByChannel = BTreeMap<String, Vec<MessageId>>;

/// Messages per channel, the result of `get_messages_by_id`
pub type MessagesByChannel = BTreeMap<String, Vec<Message>>;

pub const METHOD_PUBLISH: &str = "publish";
pub const METHOD_SUBSCRIBE: &str = "subscribe";
pub const METHOD_UNSUBSCRIBE: &str = "unsubscribe";
pub const METHOD_CATCHUP: &str = "catchup";
pub const METHOD_HEARTBEAT: &str = "heartbeat";
pub const METHOD_GET_MESSAGES_BY_ID: &str = "get_messages_by_id";
pub const METHOD_GREET_SERVER: &str = "greet_server";
pub const METHOD_RUMOR: &str = "rumor";
pub const METHOD_RUMOR_STATE: &str = "rumor_state";
pub const METHOD_BROADCAST: &str = "broadcast";

/// `{channel}` for subscribe, unsubscribe and catchup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParams {
    pub channel: String,
}

/// `{channel, message}` for publish and broadcast
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageParams {
    pub channel: String,
    pub message: Message,
}

/// `{state}` for rumor_state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RumorStateParams {
    pub state: RumorTimestamp,
}

/// A JSON-RPC method with typed parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Method {
    Publish(MessageParams),
    Subscribe(ChannelParams),
    Unsubscribe(ChannelParams),
    Catchup(ChannelParams),
    Heartbeat(IdsByChannel),
    GetMessagesById(IdsByChannel),
    GreetServer(ServerInfo),
    Rumor(Rumor),
    RumorState(RumorStateParams),
    Broadcast(MessageParams),
}

impl Method {
    /// Wire name of the method
    pub fn name(&self) -> &'static str {
        match self {
            Method::Publish(_) => METHOD_PUBLISH,
            Method::Subscribe(_) => METHOD_SUBSCRIBE,
            Method::Unsubscribe(_) => METHOD_UNSUBSCRIBE,
            Method::Catchup(_) => METHOD_CATCHUP,
            Method::Heartbeat(_) => METHOD_HEARTBEAT,
            Method::GetMessagesById(_) => METHOD_GET_MESSAGES_BY_ID,
            Method::GreetServer(_) => METHOD_GREET_SERVER,
            Method::Rumor(_) => METHOD_RUMOR,
            Method::RumorState(_) => METHOD_RUMOR_STATE,
            Method::Broadcast(_) => METHOD_BROADCAST,
        }
    }

    /// Decode `params` for the method called `name`
    pub fn from_parts(name: &str, params: Value) -> BrokerResult<Self> {
        let method = match name {
            METHOD_PUBLISH => Method::Publish(decode(name, params)?),
            METHOD_SUBSCRIBE => Method::Subscribe(decode(name, params)?),
            METHOD_UNSUBSCRIBE => Method::Unsubscribe(decode(name, params)?),
            METHOD_CATCHUP => Method::Catchup(decode(name, params)?),
            METHOD_HEARTBEAT => Method::Heartbeat(decode(name, params)?),
            METHOD_GET_MESSAGES_BY_ID => Method::GetMessagesById(decode(name, params)?),
            METHOD_GREET_SERVER => Method::GreetServer(decode(name, params)?),
            METHOD_RUMOR => Method::Rumor(decode(name, params)?),
            METHOD_RUMOR_STATE => Method::RumorState(decode(name, params)?),
            METHOD_BROADCAST => Method::Broadcast(decode(name, params)?),
            other => {
                return Err(BrokerError::InvalidAction(format!(
                    "unexpected method: '{other}'"
                )))
            }
        };
        Ok(method)
    }

    /// Parameters as a JSON value
    pub fn params(&self) -> BrokerResult<Value> {
        let value = match self {
            Method::Publish(p) | Method::Broadcast(p) => serde_json::to_value(p),
            Method::Subscribe(p) | Method::Unsubscribe(p) | Method::Catchup(p) => {
                serde_json::to_value(p)
            }
            Method::Heartbeat(ids) | Method::GetMessagesById(ids) => serde_json::to_value(ids),
            Method::GreetServer(info) => serde_json::to_value(info),
            Method::Rumor(rumor) => serde_json::to_value(rumor),
            Method::RumorState(p) => serde_json::to_value(p),
        };
        value.map_err(|e| BrokerError::Internal(format!("failed to marshal params: {e}")))
    }
}

fn decode<T: for<'de> Deserialize<'de>>(method: &str, params: Value) -> BrokerResult<T> {
    serde_json::from_value(params).map_err(|e| {
        BrokerError::InvalidMessageField(format!("invalid params for {method}: {e}"))
    })
}

/// Raw query envelope; `params` stays untyped until the method is known
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryEnvelope {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QueryId>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl QueryEnvelope {
    /// Decode the typed method
    pub fn decode(self) -> BrokerResult<Method> {
        Method::from_parts(&self.method, self.params)
    }
}

/// Outgoing query or notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// `None` for notifications (rumor, heartbeat, greet, broadcast)
    pub id: Option<QueryId>,
    pub method: Method,
}

impl Query {
    /// A query that expects an answer
    pub fn new(id: QueryId, method: Method) -> Self {
        Query {
            id: Some(id),
            method,
        }
    }

    /// A fire-and-forget notification
    pub fn notification(method: Method) -> Self {
        Query { id: None, method }
    }

    /// Serialize to a single JSON document
    pub fn to_bytes(&self) -> BrokerResult<Vec<u8>> {
        let envelope = QueryEnvelope {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: self.id,
            method: self.method.name().to_string(),
            params: self.method.params()?,
        };
        serde_json::to_vec(&envelope)
            .map_err(|e| BrokerError::Internal(format!("failed to marshal query: {e}")))
    }
}

/// `broadcast{channel, message}` sent to channel subscribers
pub fn broadcast(channel: &str, message: &Message) -> BrokerResult<Vec<u8>> {
    Query::notification(Method::Broadcast(MessageParams {
        channel: channel.to_string(),
        message: message.clone(),
    }))
    .to_bytes()
}

/// `greet_server` announcing `info`
pub fn greet_server(info: &ServerInfo) -> BrokerResult<Vec<u8>> {
    Query::notification(Method::GreetServer(info.clone())).to_bytes()
}

/// `heartbeat` carrying every held message id
pub fn heartbeat(ids: IdsByChannel) -> BrokerResult<Vec<u8>> {
    Query::notification(Method::Heartbeat(ids)).to_bytes()
}

/// `rumor` gossip notification
pub fn rumor(rumor: &Rumor) -> BrokerResult<Vec<u8>> {
    Query::notification(Method::Rumor(rumor.clone())).to_bytes()
}

/// `get_messages_by_id` query for the ids in `missing`
pub fn get_messages_by_id(id: QueryId, missing: IdsByChannel) -> BrokerResult<Vec<u8>> {
    Query::new(id, Method::GetMessagesById(missing)).to_bytes()
}

/// `rumor_state` query advertising the local vector clock
pub fn rumor_state(id: QueryId, state: RumorTimestamp) -> BrokerResult<Vec<u8>> {
    Query::new(id, Method::RumorState(RumorStateParams { state })).to_bytes()
}
