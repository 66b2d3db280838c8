//! Message repository
//!
//! The append-only channel logs. Storage engines plug in behind the
//! `Repository` trait; `InMemoryRepository` keeps everything in maps.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use tidings_core::{BrokerError, BrokerResult, Message, MessageId};
use tidings_wire::{IdsByChannel, MessagesByChannel};

/// Persistent store of channel logs
pub trait Repository: Send + Sync {
    /// Append `message` to `channel`; `false` if the id was already stored
    fn store_message(&self, channel: &str, message: Message) -> BrokerResult<bool>;

    fn has_message(&self, id: &MessageId) -> BrokerResult<bool>;

    fn get_message_by_id(&self, id: &MessageId) -> BrokerResult<Option<Message>>;

    /// Every requested message that is held, grouped by requested channel
    fn get_messages_by_id(&self, requested: &IdsByChannel) -> BrokerResult<MessagesByChannel>;

    /// Every stored id per channel, in arrival order
    fn get_ids_table(&self) -> BrokerResult<IdsByChannel>;

    /// The log of one channel in arrival order
    fn get_all_messages_from_channel(&self, channel: &str) -> BrokerResult<Vec<Message>>;

    fn get_all_channels(&self) -> BrokerResult<Vec<String>>;
}

#[derive(Default)]
struct ChannelLog {
    order: Vec<MessageId>,
}

#[derive(Default)]
struct RepositoryInner {
    channels: BTreeMap<String, ChannelLog>,
    messages: HashMap<MessageId, Message>,
}

/// Repository held in memory
#[derive(Default)]
pub struct InMemoryRepository {
    inner: RwLock<RepositoryInner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }
}

impl Repository for InMemoryRepository {
    fn store_message(&self, channel: &str, message: Message) -> BrokerResult<bool> {
        let mut inner = self.inner.write();
        if inner.messages.contains_key(message.id()) {
            return Ok(false);
        }
        let id = message.id().clone();
        inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .order
            .push(id.clone());
        inner.messages.insert(id, message);
        Ok(true)
    }

    fn has_message(&self, id: &MessageId) -> BrokerResult<bool> {
        Ok(self.inner.read().messages.contains_key(id))
    }

    fn get_message_by_id(&self, id: &MessageId) -> BrokerResult<Option<Message>> {
        Ok(self.inner.read().messages.get(id).cloned())
    }

    fn get_messages_by_id(&self, requested: &IdsByChannel) -> BrokerResult<MessagesByChannel> {
        let inner = self.inner.read();
        let mut found = MessagesByChannel::new();
        for (channel, ids) in requested {
            let messages: Vec<Message> = ids
                .iter()
                .filter_map(|id| inner.messages.get(id).cloned())
                .collect();
            if !messages.is_empty() {
                found.insert(channel.clone(), messages);
            }
        }
        Ok(found)
    }

    fn get_ids_table(&self) -> BrokerResult<IdsByChannel> {
        let inner = self.inner.read();
        Ok(inner
            .channels
            .iter()
            .map(|(channel, log)| (channel.clone(), log.order.clone()))
            .collect())
    }

    fn get_all_messages_from_channel(&self, channel: &str) -> BrokerResult<Vec<Message>> {
        let inner = self.inner.read();
        let log = inner.channels.get(channel).ok_or_else(|| {
            BrokerError::InvalidResource(format!("channel {channel} has no messages"))
        })?;
        log.order
            .iter()
            .map(|id| {
                inner.messages.get(id).cloned().ok_or_else(|| {
                    BrokerError::Internal(format!("message {id} indexed but not stored"))
                })
            })
            .collect()
    }

    fn get_all_channels(&self) -> BrokerResult<Vec<String>> {
        Ok(self.inner.read().channels.keys().cloned().collect())
    }
}
