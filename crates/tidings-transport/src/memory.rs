//! In-memory socket
//!
//! Frames accumulate in an outbox until drained. Used by unit tests and by
//! the in-process mesh, which moves frames between hubs by hand.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use tidings_core::{BrokerError, BrokerResult, SocketId};

use crate::{Socket, SocketType};

pub struct MemorySocket {
    id: SocketId,
    socket_type: SocketType,
    outbox: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemorySocket {
    pub fn new(id: impl Into<String>, socket_type: SocketType) -> Self {
        MemorySocket {
            id: SocketId::new(id),
            socket_type,
            outbox: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Take every queued frame, oldest first
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.outbox.lock().drain(..).collect()
    }

    /// Take every queued frame parsed as JSON
    pub fn drain_json(&self) -> Vec<Value> {
        self.drain()
            .iter()
            .filter_map(|frame| serde_json::from_slice(frame).ok())
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Make every further send fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Socket for MemorySocket {
    fn id(&self) -> &SocketId {
        &self.id
    }

    fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn send(&self, frame: Vec<u8>) -> BrokerResult<()> {
        if self.is_closed() {
            return Err(BrokerError::Transport(format!("socket {} is closed", self.id)));
        }
        self.outbox.lock().push_back(frame);
        Ok(())
    }
}

impl std::fmt::Debug for MemorySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySocket")
            .field("id", &self.id)
            .field("type", &self.socket_type)
            .field("pending", &self.pending())
            .finish()
    }
}
