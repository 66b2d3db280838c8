//! Message ingestion
//!
//! The common tail of every ingress path once a message is verified:
//! channel semantics, storage, then fan-out to local subscribers.

use tidings_core::{BrokerError, BrokerResult, Message};

use crate::{ChannelHandler, Repository, Subscribers};

/// Outcome of handing a message to `Ingest::accept`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accepted {
    /// Newly stored and broadcast
    Stored,
    /// Already held; nothing happened
    Duplicate,
}

/// Borrowed view of what storing a message touches
#[derive(Clone, Copy)]
pub struct Ingest<'a> {
    pub repository: &'a dyn Repository,
    pub subscribers: &'a Subscribers,
    pub handler: &'a dyn ChannelHandler,
}

impl<'a> Ingest<'a> {
    pub fn new(
        repository: &'a dyn Repository,
        subscribers: &'a Subscribers,
        handler: &'a dyn ChannelHandler,
    ) -> Self {
        Ingest {
            repository,
            subscribers,
            handler,
        }
    }

    /// Run the channel handler, store, then broadcast to subscribers
    pub fn accept(&self, channel: &str, message: &Message) -> BrokerResult<Accepted> {
        if self.repository.has_message(message.id())? {
            return Ok(Accepted::Duplicate);
        }

        self.handler
            .handle_message(channel, message, self.subscribers)?;

        if !self.repository.store_message(channel, message.clone())? {
            return Ok(Accepted::Duplicate);
        }

        self.broadcast(channel, message)?;
        Ok(Accepted::Stored)
    }

    /// Notify subscribers of `channel` about `message`
    pub fn broadcast(&self, channel: &str, message: &Message) -> BrokerResult<()> {
        let frame = tidings_wire::broadcast(channel, message)?;
        match self.subscribers.send_to_all(&frame, channel) {
            Ok(delivered) => {
                tracing::trace!(%channel, message_id = %message.id(), delivered, "broadcast");
                Ok(())
            }
            // The handler chose not to register this channel: nobody listens
            Err(BrokerError::InvalidResource(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tidings_core::MessageId;
    use tidings_transport::{MemorySocket, SocketType};

    use crate::{AutoCreateChannels, HierarchicalChannels, InMemoryRepository};

    fn msg(id: &str) -> Message {
        Message::new("ZA==", "cw==", "cw==", MessageId::new(id))
    }

    #[test]
    fn test_accept_stores_and_broadcasts() {
        let repo = InMemoryRepository::new();
        let subs = Subscribers::new();
        subs.add_channel("/root/lao").unwrap();
        let client = Arc::new(MemorySocket::new("c1", SocketType::Client));
        subs.subscribe("/root/lao", client.clone()).unwrap();

        let ingest = Ingest::new(&repo, &subs, &AutoCreateChannels);
        assert_eq!(ingest.accept("/root/lao", &msg("m1")).unwrap(), Accepted::Stored);
        assert_eq!(ingest.accept("/root/lao", &msg("m1")).unwrap(), Accepted::Duplicate);

        let frames = client.drain_json();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["method"], "broadcast");
        assert_eq!(frames[0]["params"]["channel"], "/root/lao");
        assert_eq!(frames[0]["params"]["message"]["message_id"], "m1");
    }

    #[test]
    fn test_handler_refusal_stores_nothing() {
        let repo = InMemoryRepository::new();
        let subs = Subscribers::new();
        let ingest = Ingest::new(&repo, &subs, &HierarchicalChannels);

        let err = ingest.accept("/root/lao/e1", &msg("m1")).unwrap_err();
        assert_eq!(err.code(), -2);
        assert_eq!(repo.message_count(), 0);
    }
}
