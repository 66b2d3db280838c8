//! Subscription registry
//!
//! Channels must be registered before anyone may subscribe to them. Each
//! channel maps to the sockets subscribed to it; the registry does not own
//! the connections.

use std::collections::HashMap;

use parking_lot::RwLock;

use tidings_core::{BrokerError, BrokerResult, SocketId};
use tidings_transport::SocketRef;

type SubscriberSet = HashMap<SocketId, SocketRef>;

#[derive(Default)]
pub struct Subscribers {
    channels: RwLock<HashMap<String, SubscriberSet>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel with no subscribers
    pub fn add_channel(&self, channel: &str) -> BrokerResult<()> {
        let mut channels = self.channels.write();
        if channels.contains_key(channel) {
            return Err(BrokerError::DuplicateResource(format!(
                "channel {channel} already exists"
            )));
        }
        channels.insert(channel.to_string(), SubscriberSet::new());
        Ok(())
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.read().contains_key(channel)
    }

    pub fn subscribe(&self, channel: &str, socket: SocketRef) -> BrokerResult<()> {
        let mut channels = self.channels.write();
        let set = channels.get_mut(channel).ok_or_else(|| unknown(channel))?;
        set.insert(socket.id().clone(), socket);
        Ok(())
    }

    pub fn unsubscribe(&self, channel: &str, socket_id: &SocketId) -> BrokerResult<()> {
        let mut channels = self.channels.write();
        let set = channels.get_mut(channel).ok_or_else(|| unknown(channel))?;
        if set.remove(socket_id).is_none() {
            return Err(BrokerError::InvalidAction(format!(
                "cannot unsubscribe from {channel}: socket {socket_id} is not subscribed"
            )));
        }
        Ok(())
    }

    pub fn is_subscribed(&self, channel: &str, socket_id: &SocketId) -> BrokerResult<bool> {
        let channels = self.channels.read();
        let set = channels.get(channel).ok_or_else(|| unknown(channel))?;
        Ok(set.contains_key(socket_id))
    }

    /// Drop `socket_id` from every channel; returns how many it was in
    pub fn unsubscribe_from_all(&self, socket_id: &SocketId) -> usize {
        self.channels
            .write()
            .values_mut()
            .filter_map(|set| set.remove(socket_id))
            .count()
    }

    /// Send `frame` to every subscriber of `channel`
    ///
    /// A failing socket is logged and skipped. Returns the number of
    /// successful sends.
    pub fn send_to_all(&self, frame: &[u8], channel: &str) -> BrokerResult<usize> {
        let channels = self.channels.read();
        let set = channels.get(channel).ok_or_else(|| unknown(channel))?;

        let mut delivered = 0;
        for socket in set.values() {
            match socket.send(frame.to_vec()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(socket = %socket.id(), %channel, "failed to send to subscriber: {}", e)
                }
            }
        }
        Ok(delivered)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map_or(0, HashMap::len)
    }
}

fn unknown(channel: &str) -> BrokerError {
    BrokerError::InvalidResource(format!("channel {channel} does not exist"))
}
