//! Identity types for the Tidings broker
//!
//! Message ids are content hashes rendered as base64url strings; socket ids
//! are opaque per-connection strings minted by the transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Message identity - base64url SHA-256 of the signed payload
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        MessageId(s)
    }
}

/// Socket identity - unique per connection for the lifetime of a server
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SocketId(pub String);

impl SocketId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        SocketId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Socket({})", self.0)
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a JSON-RPC query
pub type QueryId = u64;

/// Sequence number of a rumor, owned by its origin server
pub type RumorId = u64;
