//! Socket capability

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use tidings_core::{BrokerError, BrokerResult, QueryId, SocketId};
use tidings_wire::Answer;

/// Which side of the federation a socket talks to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketType {
    Client,
    Server,
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketType::Client => f.write_str("client"),
            SocketType::Server => f.write_str("server"),
        }
    }
}

/// An open connection frames can be written to
///
/// `send` must not block: implementations queue the frame and fail fast
/// when the queue is full or the connection is gone.
pub trait Socket: Send + Sync {
    fn id(&self) -> &SocketId;

    fn socket_type(&self) -> SocketType;

    /// Queue one JSON document
    fn send(&self, frame: Vec<u8>) -> BrokerResult<()>;

    /// Answer query `id` with `result`
    fn send_result(&self, id: Option<QueryId>, result: Value) -> BrokerResult<()> {
        self.send(Answer::ok(id, result).to_bytes()?)
    }

    /// Answer query `id` with an error
    fn send_error(&self, id: Option<QueryId>, err: &BrokerError) -> BrokerResult<()> {
        self.send(Answer::error(id, err).to_bytes()?)
    }
}

/// Shared handle to a socket
pub type SocketRef = Arc<dyn Socket>;

/// Receiver of inbound frames, implemented by the hub
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one inbound JSON document read from `socket`
    fn handle_message(&self, socket: SocketRef, frame: &[u8]);

    /// The connection behind `socket_id` is gone
    fn on_socket_closed(&self, socket_id: &SocketId);
}

/// Mint a socket id unique for the lifetime of the process
pub fn new_socket_id(socket_type: SocketType, label: &str) -> SocketId {
    SocketId::new(format!("{socket_type}-{label}-{:016x}", rand::random::<u64>()))
}
