//! Rumor definitions
//!
//! A rumor is a batch of freshly published messages gossiped between
//! servers. It is tagged with its origin, a per-origin sequence number and
//! a snapshot of the origin's vector clock taken at emission time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Message, RumorId};

/// Vector clock: last rumor id seen per origin server
///
/// Ordering here is causal, not total. Entries only ever grow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RumorTimestamp {
    clocks: BTreeMap<String, RumorId>,
}

impl RumorTimestamp {
    pub fn new() -> Self {
        RumorTimestamp {
            clocks: BTreeMap::new(),
        }
    }

    /// Last rumor id seen from `sender`, if any
    #[inline]
    pub fn get(&self, sender: &str) -> Option<RumorId> {
        self.clocks.get(sender).copied()
    }

    /// Raise the entry for `sender` to `rumor_id`; lower values are ignored
    pub fn advance(&mut self, sender: &str, rumor_id: RumorId) {
        self.clocks
            .entry(sender.to_string())
            .and_modify(|c| *c = (*c).max(rumor_id))
            .or_insert(rumor_id);
    }

    /// Whether a rumor stamped with `remote` may be applied on top of `self`
    ///
    /// Every origin the remote clock mentions must already be known locally
    /// at least up to the same rumor id. An origin absent locally is only
    /// acceptable when the remote claims nothing beyond its rumor 0.
    pub fn is_valid(&self, remote: &RumorTimestamp) -> bool {
        remote.clocks.iter().all(|(sender, &claimed)| match self.get(sender) {
            Some(local) => local >= claimed,
            None => claimed == 0,
        })
    }

    /// Does `self` know about rumor `rumor_id` of `sender`?
    pub fn covers(&self, sender: &str, rumor_id: RumorId) -> bool {
        self.get(sender).is_some_and(|local| local >= rumor_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RumorId)> {
        self.clocks.iter().map(|(s, &id)| (s.as_str(), id))
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

impl FromIterator<(String, RumorId)> for RumorTimestamp {
    fn from_iter<I: IntoIterator<Item = (String, RumorId)>>(iter: I) -> Self {
        RumorTimestamp {
            clocks: iter.into_iter().collect(),
        }
    }
}

/// Messages of a rumor grouped by channel
pub type MessagesByChannel = BTreeMap<String, Vec<Message>>;

/// Gossip batch, also the `params` of the `rumor` method
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rumor {
    /// Base64url public key of the origin server
    pub sender_id: String,
    /// Sequence number owned by the origin
    pub rumor_id: RumorId,
    /// Origin's vector clock when the rumor was emitted
    pub timestamp: RumorTimestamp,
    /// Carried messages
    pub messages: MessagesByChannel,
}

impl Rumor {
    pub fn new(sender_id: impl Into<String>, rumor_id: RumorId, timestamp: RumorTimestamp) -> Self {
        Rumor {
            sender_id: sender_id.into(),
            rumor_id,
            timestamp,
            messages: BTreeMap::new(),
        }
    }

    pub fn with_messages(mut self, messages: MessagesByChannel) -> Self {
        self.messages = messages;
        self
    }

    /// Total number of carried messages
    pub fn message_count(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }
}
