//! Set of sockets connected to other servers
//!
//! Rumors, heartbeats and rumor states are broadcast over these.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use tidings_core::SocketId;
use tidings_transport::SocketRef;

#[derive(Default)]
pub struct PeerSockets {
    sockets: RwLock<BTreeMap<SocketId, SocketRef>>,
}

impl PeerSockets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the socket with the same id
    pub fn upsert(&self, socket: SocketRef) {
        self.sockets.write().insert(socket.id().clone(), socket);
    }

    pub fn remove(&self, socket_id: &SocketId) -> Option<SocketRef> {
        self.sockets.write().remove(socket_id)
    }

    pub fn contains(&self, socket_id: &SocketId) -> bool {
        self.sockets.read().contains_key(socket_id)
    }

    pub fn len(&self) -> usize {
        self.sockets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<SocketRef> {
        self.sockets.read().values().cloned().collect()
    }

    /// Send to every peer; returns the number of successful sends
    pub fn send_to_all(&self, frame: &[u8]) -> usize {
        self.send_filtered(frame, None)
    }

    /// Send to every peer but `except`
    pub fn send_to_all_except(&self, frame: &[u8], except: &SocketId) -> usize {
        self.send_filtered(frame, Some(except))
    }

    fn send_filtered(&self, frame: &[u8], except: Option<&SocketId>) -> usize {
        let sockets = self.sockets.read();
        let mut delivered = 0;
        for (id, socket) in sockets.iter() {
            if Some(id) == except {
                continue;
            }
            match socket.send(frame.to_vec()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(socket = %id, "failed to send to peer: {}", e),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidings_transport::{MemorySocket, Socket, SocketType};

    #[test]
    fn test_send_to_all_except() {
        let sockets = PeerSockets::new();
        let a = Arc::new(MemorySocket::new("a", SocketType::Server));
        let b = Arc::new(MemorySocket::new("b", SocketType::Server));
        sockets.upsert(a.clone());
        sockets.upsert(b.clone());
        sockets.upsert(b.clone());
        assert_eq!(sockets.len(), 2);

        assert_eq!(sockets.send_to_all_except(b"x", b.id()), 1);
        assert_eq!(a.pending(), 1);
        assert_eq!(b.pending(), 0);

        assert_eq!(sockets.send_to_all(b"y"), 2);
    }

    #[test]
    fn test_remove() {
        let sockets = PeerSockets::new();
        let a = Arc::new(MemorySocket::new("a", SocketType::Server));
        sockets.upsert(a.clone());
        assert!(sockets.remove(a.id()).is_some());
        assert!(sockets.is_empty());
        assert!(!sockets.contains(a.id()));
    }
}
