//! Heartbeat / catchup reconciliation
//!
//! Pull-based anti-entropy: a heartbeat advertises every held message id,
//! the receiver asks for the ones it lacks with `get_messages_by_id` and
//! merges the answer like any other ingress.

use tidings_core::{BrokerResult, MessageId};
use tidings_crypto::verify_message;
use tidings_wire::{IdsByChannel, MessagesByChannel};

use crate::{Accepted, Ingest, Repository};

/// Counters of a `merge_messages` pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub stored: u32,
    pub duplicates: u32,
    pub rejected: u32,
}

/// Per channel, the advertised ids we do not hold
pub fn missing_ids(
    repository: &dyn Repository,
    advertised: &IdsByChannel,
) -> BrokerResult<IdsByChannel> {
    let mut missing = IdsByChannel::new();
    for (channel, ids) in advertised {
        let mut gap: Vec<MessageId> = Vec::new();
        for id in ids {
            if !repository.has_message(id)? && !gap.contains(id) {
                gap.push(id.clone());
            }
        }
        if !gap.is_empty() {
            missing.insert(channel.clone(), gap);
        }
    }
    Ok(missing)
}

/// Answer to `get_messages_by_id`: whatever we still hold
pub fn collect_requested(
    repository: &dyn Repository,
    requested: &IdsByChannel,
) -> BrokerResult<MessagesByChannel> {
    repository.get_messages_by_id(requested)
}

/// Verify and store every message of a `get_messages_by_id` answer
///
/// Messages that fail verification or whose channel is not ready are
/// skipped; a later heartbeat asks for them again.
pub fn merge_messages(ingest: &Ingest<'_>, batch: &MessagesByChannel) -> BrokerResult<MergeOutcome> {
    let mut outcome = MergeOutcome::default();

    for (channel, messages) in batch {
        for message in messages {
            if let Err(e) = verify_message(message) {
                tracing::warn!(%channel, message_id = %message.id(), "rejecting fetched message: {}", e);
                outcome.rejected += 1;
                continue;
            }
            match ingest.accept(channel, message) {
                Ok(Accepted::Stored) => outcome.stored += 1,
                Ok(Accepted::Duplicate) => outcome.duplicates += 1,
                Err(e) => {
                    tracing::debug!(%channel, message_id = %message.id(), "fetched message not stored: {}", e);
                    outcome.rejected += 1;
                }
            }
        }
    }

    Ok(outcome)
}
