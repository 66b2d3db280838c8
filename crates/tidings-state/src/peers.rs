//! Peer registry
//!
//! Tracks what each connected server announced in `greet_server` and
//! whether we already greeted it back.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use tidings_core::{BrokerError, BrokerResult, ServerInfo, SocketId};

#[derive(Default)]
struct PeersInner {
    infos: HashMap<SocketId, ServerInfo>,
    greeted: HashSet<SocketId>,
}

#[derive(Default)]
pub struct Peers {
    inner: RwLock<PeersInner>,
}

impl Peers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `info` to `socket_id`; rebinding to different info is refused
    pub fn add_peer_info(&self, socket_id: &SocketId, info: ServerInfo) -> BrokerResult<()> {
        let mut inner = self.inner.write();
        match inner.infos.get(socket_id) {
            Some(existing) if *existing == info => Ok(()),
            Some(existing) => Err(BrokerError::InvalidAction(format!(
                "socket {socket_id} already greeted as {}",
                existing.public_key
            ))),
            None => {
                inner.infos.insert(socket_id.clone(), info);
                Ok(())
            }
        }
    }

    pub fn add_peer_greeted(&self, socket_id: &SocketId) {
        self.inner.write().greeted.insert(socket_id.clone());
    }

    pub fn is_peer_greeted(&self, socket_id: &SocketId) -> bool {
        self.inner.read().greeted.contains(socket_id)
    }

    /// Every distinct server we know about
    pub fn get_all_peers_info(&self) -> Vec<ServerInfo> {
        let inner = self.inner.read();
        let mut infos: Vec<ServerInfo> = inner
            .infos
            .values()
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        infos.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        infos
    }

    pub fn get_peer_info(&self, socket_id: &SocketId) -> Option<ServerInfo> {
        self.inner.read().infos.get(socket_id).cloned()
    }

    /// Forget a closed socket so a reconnect handshakes again
    pub fn remove_peer(&self, socket_id: &SocketId) {
        let mut inner = self.inner.write();
        inner.infos.remove(socket_id);
        inner.greeted.remove(socket_id);
    }
}
