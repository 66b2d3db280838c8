//! Per-channel message semantics
//!
//! A `ChannelHandler` runs before a message is stored. Returning
//! `InvalidResource` means a prerequisite is missing; messages arriving by
//! gossip are kept aside and retried later in that case.

use tidings_core::{parent_channel, BrokerError, BrokerResult, Message};

use crate::Subscribers;

pub trait ChannelHandler: Send + Sync {
    fn handle_message(
        &self,
        channel: &str,
        message: &Message,
        subscribers: &Subscribers,
    ) -> BrokerResult<()>;
}

/// Register the channel on its first message
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoCreateChannels;

impl ChannelHandler for AutoCreateChannels {
    fn handle_message(
        &self,
        channel: &str,
        _message: &Message,
        subscribers: &Subscribers,
    ) -> BrokerResult<()> {
        ensure_channel(channel, subscribers)
    }
}

/// Like `AutoCreateChannels`, but a channel below `/root/<id>` needs its
/// parent to exist first
#[derive(Clone, Copy, Debug, Default)]
pub struct HierarchicalChannels;

impl ChannelHandler for HierarchicalChannels {
    fn handle_message(
        &self,
        channel: &str,
        _message: &Message,
        subscribers: &Subscribers,
    ) -> BrokerResult<()> {
        if let Some(parent) = parent_channel(channel) {
            if parent_channel(parent).is_some() && !subscribers.has_channel(parent) {
                return Err(BrokerError::InvalidResource(format!(
                    "parent channel {parent} of {channel} does not exist"
                )));
            }
        }
        ensure_channel(channel, subscribers)
    }
}

fn ensure_channel(channel: &str, subscribers: &Subscribers) -> BrokerResult<()> {
    match subscribers.add_channel(channel) {
        Ok(()) => {
            tracing::debug!(%channel, "registered channel");
            Ok(())
        }
        Err(BrokerError::DuplicateResource(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
