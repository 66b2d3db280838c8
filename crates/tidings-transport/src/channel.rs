//! Bounded channel socket
//!
//! `send` enqueues with `try_send` into a bounded tokio channel; a writer
//! task owns the receiving end and performs the actual I/O.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use tidings_core::{BrokerError, BrokerResult, SocketId};

use crate::{Socket, SocketType};

/// Receiving end of a channel socket
pub type FrameReceiver = mpsc::Receiver<Vec<u8>>;

pub struct ChannelSocket {
    id: SocketId,
    socket_type: SocketType,
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelSocket {
    /// Create a socket and the receiver its writer task drains
    pub fn new(id: SocketId, socket_type: SocketType, buffer: usize) -> (Self, FrameReceiver) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            ChannelSocket {
                id,
                socket_type,
                tx,
            },
            rx,
        )
    }
}

impl Socket for ChannelSocket {
    fn id(&self) -> &SocketId {
        &self.id
    }

    fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn send(&self, frame: Vec<u8>) -> BrokerResult<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => {
                BrokerError::Transport(format!("send buffer of {} is full", self.id))
            }
            TrySendError::Closed(_) => {
                BrokerError::Transport(format!("socket {} is closed", self.id))
            }
        })
    }
}
