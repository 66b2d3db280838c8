//! Rumor engine
//!
//! Batches freshly published messages into rumors, keeps the log of every
//! rumor seen (by message id) and the local vector clock. Rumors are applied
//! only when causally ready; everything else is left to rumor state and
//! heartbeat reconciliation.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use tidings_core::{
    BrokerError, BrokerResult, Message, MessageId, Rumor, RumorId, RumorTimestamp,
};
use tidings_wire::MessagesByChannel;

use crate::{Accepted, Ingest, Repository};

/// What the log keeps of a rumor
#[derive(Clone, Debug)]
struct RumorRecord {
    timestamp: RumorTimestamp,
    messages: BTreeMap<String, Vec<MessageId>>,
}

#[derive(Default)]
struct RumorState {
    my_rumor_counter: RumorId,
    my_timestamp: RumorTimestamp,
    buffer: Vec<(String, MessageId)>,
    log: BTreeMap<(String, RumorId), RumorRecord>,
    unprocessed: BTreeMap<String, BTreeMap<MessageId, Message>>,
}

/// Result of `RumorEngine::check_rumor`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RumorCheck {
    pub is_duplicate: bool,
    pub is_valid: bool,
}

pub struct RumorEngine {
    server_id: String,
    state: RwLock<RumorState>,
}

impl RumorEngine {
    /// Engine for the server whose public key is `server_id`
    pub fn new(server_id: impl Into<String>) -> Self {
        RumorEngine {
            server_id: server_id.into(),
            state: RwLock::new(RumorState::default()),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Queue a stored message for the next rumor; returns the buffer size
    pub fn add_message_to_my_rumor(&self, channel: &str, message_id: MessageId) -> usize {
        let mut state = self.state.write();
        state.buffer.push((channel.to_string(), message_id));
        state.buffer.len()
    }

    pub fn buffered(&self) -> usize {
        self.state.read().buffer.len()
    }

    /// Seal the buffer into a new rumor, `None` if there is nothing to send
    pub fn get_and_increment_my_rumor(
        &self,
        repository: &dyn Repository,
    ) -> BrokerResult<Option<Rumor>> {
        let (rumor_id, record) = {
            let mut state = self.state.write();
            if state.buffer.is_empty() {
                return Ok(None);
            }

            let mut messages: BTreeMap<String, Vec<MessageId>> = BTreeMap::new();
            for (channel, id) in state.buffer.drain(..) {
                messages.entry(channel).or_default().push(id);
            }

            let rumor_id = state.my_rumor_counter;
            state.my_rumor_counter += 1;

            let record = RumorRecord {
                timestamp: state.my_timestamp.clone(),
                messages,
            };
            state
                .log
                .insert((self.server_id.clone(), rumor_id), record.clone());
            state.my_timestamp.advance(&self.server_id, rumor_id);
            (rumor_id, record)
        };

        tracing::debug!(rumor_id, "sealed rumor");
        let rumor = self.rehydrate(&self.server_id, rumor_id, &record, repository)?;
        Ok(Some(rumor))
    }

    pub fn check_rumor(
        &self,
        sender_id: &str,
        rumor_id: RumorId,
        timestamp: &RumorTimestamp,
    ) -> RumorCheck {
        let state = self.state.read();
        RumorCheck {
            is_duplicate: state.log.contains_key(&(sender_id.to_string(), rumor_id)),
            is_valid: state.my_timestamp.is_valid(timestamp),
        }
    }

    /// Record `rumor` and fold its messages into the channel logs
    ///
    /// Returns `false` without touching anything if the rumor was already
    /// stored. Messages whose channel is not ready yet become unprocessed.
    pub fn store_rumor(&self, ingest: &Ingest<'_>, rumor: &Rumor) -> BrokerResult<bool> {
        {
            let mut state = self.state.write();
            let key = (rumor.sender_id.clone(), rumor.rumor_id);
            if state.log.contains_key(&key) {
                return Ok(false);
            }
            let record = RumorRecord {
                timestamp: rumor.timestamp.clone(),
                messages: rumor
                    .messages
                    .iter()
                    .map(|(channel, msgs)| {
                        (channel.clone(), msgs.iter().map(|m| m.id().clone()).collect())
                    })
                    .collect(),
            };
            state.log.insert(key, record);
            state.my_timestamp.advance(&rumor.sender_id, rumor.rumor_id);
        }

        // the rumor is already logged, so every message gets its chance
        let mut failure = None;
        for (channel, messages) in &rumor.messages {
            for message in messages {
                if let Err(e) = self.merge(ingest, channel, message) {
                    tracing::error!(%channel, message_id = %message.id(), "failed to merge rumor message: {}", e);
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        tracing::debug!(
            sender = %rumor.sender_id,
            rumor_id = rumor.rumor_id,
            messages = rumor.message_count(),
            "stored rumor"
        );
        Ok(true)
    }

    fn merge(&self, ingest: &Ingest<'_>, channel: &str, message: &Message) -> BrokerResult<()> {
        match ingest.accept(channel, message) {
            Ok(_) => Ok(()),
            Err(BrokerError::InvalidResource(reason)) => {
                tracing::debug!(%channel, message_id = %message.id(), %reason, "message deferred");
                self.state
                    .write()
                    .unprocessed
                    .entry(channel.to_string())
                    .or_default()
                    .insert(message.id().clone(), message.clone());
                Ok(())
            }
            Err(BrokerError::Internal(reason)) => Err(BrokerError::Internal(reason)),
            Err(e) => {
                tracing::warn!(%channel, message_id = %message.id(), "dropping rumor message: {}", e);
                Ok(())
            }
        }
    }

    /// Messages carried by stored rumors that are not in a channel log yet
    pub fn get_unprocessed_messages_by_channel(&self) -> MessagesByChannel {
        self.state
            .read()
            .unprocessed
            .iter()
            .map(|(channel, msgs)| (channel.clone(), msgs.values().cloned().collect()))
            .collect()
    }

    pub fn unprocessed_count(&self) -> usize {
        self.state.read().unprocessed.values().map(BTreeMap::len).sum()
    }

    /// Try the unprocessed messages again until no more can be stored
    ///
    /// Returns how many left the unprocessed set.
    pub fn retry_unprocessed(&self, ingest: &Ingest<'_>) -> BrokerResult<usize> {
        let mut settled = 0;
        loop {
            let pending = self.get_unprocessed_messages_by_channel();
            let mut progress = false;

            for (channel, messages) in pending {
                for message in messages {
                    let done = match ingest.accept(&channel, &message) {
                        Ok(Accepted::Stored) | Ok(Accepted::Duplicate) => true,
                        Err(BrokerError::InvalidResource(_)) => false,
                        Err(BrokerError::Internal(reason)) => {
                            return Err(BrokerError::Internal(reason))
                        }
                        Err(e) => {
                            tracing::warn!(%channel, message_id = %message.id(), "dropping unprocessed message: {}", e);
                            true
                        }
                    };
                    if done {
                        let mut state = self.state.write();
                        if let Some(set) = state.unprocessed.get_mut(&channel) {
                            set.remove(message.id());
                            if set.is_empty() {
                                state.unprocessed.remove(&channel);
                            }
                        }
                        settled += 1;
                        progress = true;
                    }
                }
            }

            if !progress {
                return Ok(settled);
            }
        }
    }

    /// Snapshot of the local vector clock
    pub fn rumor_timestamp(&self) -> RumorTimestamp {
        self.state.read().my_timestamp.clone()
    }

    /// Every logged rumor the holder of `timestamp` has not seen
    pub fn rumors_missing_from(
        &self,
        timestamp: &RumorTimestamp,
        repository: &dyn Repository,
    ) -> BrokerResult<Vec<Rumor>> {
        let mut missing: Vec<(String, RumorId, RumorRecord)> = self
            .state
            .read()
            .log
            .iter()
            .filter(|((sender, id), _)| !timestamp.covers(sender, *id))
            .map(|((sender, id), record)| (sender.clone(), *id, record.clone()))
            .collect();
        missing.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));

        missing
            .iter()
            .map(|(sender, id, record)| self.rehydrate(sender, *id, record, repository))
            .collect()
    }

    pub fn rumor_count(&self) -> usize {
        self.state.read().log.len()
    }

    fn rehydrate(
        &self,
        sender: &str,
        rumor_id: RumorId,
        record: &RumorRecord,
        repository: &dyn Repository,
    ) -> BrokerResult<Rumor> {
        let mut messages = MessagesByChannel::new();
        for (channel, ids) in &record.messages {
            let mut found = Vec::with_capacity(ids.len());
            for id in ids {
                let message = match repository.get_message_by_id(id)? {
                    Some(message) => Some(message),
                    None => self
                        .state
                        .read()
                        .unprocessed
                        .get(channel)
                        .and_then(|set| set.get(id).cloned()),
                };
                match message {
                    Some(message) => found.push(message),
                    None => tracing::debug!(%sender, rumor_id, message_id = %id, "rumor message no longer available"),
                }
            }
            if !found.is_empty() {
                messages.insert(channel.clone(), found);
            }
        }
        Ok(Rumor::new(sender, rumor_id, record.timestamp.clone()).with_messages(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use tidings_crypto::{sign_message, Identity};
    use tidings_transport::{MemorySocket, SocketType};

    use crate::{
        AutoCreateChannels, ChannelHandler, HierarchicalChannels, InMemoryRepository, Subscribers,
    };

    struct Fixture {
        repo: InMemoryRepository,
        subs: Subscribers,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                repo: InMemoryRepository::new(),
                subs: Subscribers::new(),
            }
        }

        fn ingest(&self) -> Ingest<'_> {
            Ingest::new(&self.repo, &self.subs, &AutoCreateChannels)
        }
    }

    fn message(text: &str) -> Message {
        sign_message(&Identity::from_bytes(&[1u8; 32]), text.as_bytes()).unwrap()
    }

    fn rumor(sender: &str, id: RumorId, ts: &[(&str, RumorId)], msgs: &[(&str, Message)]) -> Rumor {
        let timestamp = ts.iter().map(|(s, i)| (s.to_string(), *i)).collect();
        let mut messages = MessagesByChannel::new();
        for (channel, msg) in msgs {
            messages
                .entry(channel.to_string())
                .or_insert_with(Vec::new)
                .push(msg.clone());
        }
        Rumor::new(sender, id, timestamp).with_messages(messages)
    }

    #[test]
    fn test_seal_own_rumors() {
        let fx = Fixture::new();
        let engine = RumorEngine::new("A");
        assert!(engine.get_and_increment_my_rumor(&fx.repo).unwrap().is_none());

        let m1 = message("one");
        fx.ingest().accept("/root/lao1", &m1).unwrap();
        assert_eq!(engine.add_message_to_my_rumor("/root/lao1", m1.id().clone()), 1);

        let first = engine.get_and_increment_my_rumor(&fx.repo).unwrap().unwrap();
        assert_eq!(first.sender_id, "A");
        assert_eq!(first.rumor_id, 0);
        assert!(first.timestamp.is_empty());
        assert_eq!(first.messages["/root/lao1"], vec![m1]);
        assert_eq!(engine.buffered(), 0);
        assert_eq!(engine.rumor_timestamp().get("A"), Some(0));

        let m2 = message("two");
        fx.ingest().accept("/root/lao1", &m2).unwrap();
        engine.add_message_to_my_rumor("/root/lao1", m2.id().clone());
        let second = engine.get_and_increment_my_rumor(&fx.repo).unwrap().unwrap();
        assert_eq!(second.rumor_id, 1);
        assert_eq!(second.timestamp.get("A"), Some(0));
        assert_eq!(engine.rumor_timestamp().get("A"), Some(1));
    }

    #[test]
    fn test_first_rumor_from_unknown_origin() {
        let fx = Fixture::new();
        fx.subs.add_channel("/root/lao1").unwrap();
        let client = Arc::new(MemorySocket::new("c", SocketType::Client));
        fx.subs.subscribe("/root/lao1", client.clone()).unwrap();

        let engine = RumorEngine::new("B");
        let m = message("hello");
        let r = rumor("A", 0, &[], &[("/root/lao1", m.clone())]);

        let check = engine.check_rumor(&r.sender_id, r.rumor_id, &r.timestamp);
        assert_eq!(
            check,
            RumorCheck {
                is_duplicate: false,
                is_valid: true
            }
        );

        assert!(engine.store_rumor(&fx.ingest(), &r).unwrap());
        assert!(fx.repo.has_message(m.id()).unwrap());
        assert_eq!(engine.rumor_timestamp().get("A"), Some(0));
        assert_eq!(client.drain_json()[0]["params"]["message"]["message_id"], m.message_id.0);
    }

    #[test]
    fn test_store_twice_equals_once() {
        let fx = Fixture::new();
        let engine = RumorEngine::new("B");
        let r = rumor("A", 0, &[], &[("/root/lao1", message("x"))]);

        assert!(engine.store_rumor(&fx.ingest(), &r).unwrap());
        let clock = engine.rumor_timestamp();
        assert!(!engine.store_rumor(&fx.ingest(), &r).unwrap());

        assert_eq!(engine.rumor_timestamp(), clock);
        assert_eq!(fx.repo.message_count(), 1);
        assert_eq!(engine.rumor_count(), 1);
        assert!(engine.check_rumor("A", 0, &r.timestamp).is_duplicate);
    }

    #[test]
    fn test_premature_rumor_is_invalid() {
        let engine = RumorEngine::new("B");
        let r = rumor("A", 2, &[("A", 1)], &[]);
        let check = engine.check_rumor(&r.sender_id, r.rumor_id, &r.timestamp);
        assert!(!check.is_duplicate);
        assert!(!check.is_valid);
    }

    #[test]
    fn test_unprocessed_until_parent_exists() {
        let repo = InMemoryRepository::new();
        let subs = Subscribers::new();
        let ingest = Ingest::new(&repo, &subs, &HierarchicalChannels);
        let engine = RumorEngine::new("B");

        let child = message("vote");
        let parent = message("lao");
        engine
            .store_rumor(&ingest, &rumor("A", 0, &[], &[("/root/lao1/e1", child.clone())]))
            .unwrap();
        assert_eq!(engine.unprocessed_count(), 1);
        assert_eq!(
            engine.get_unprocessed_messages_by_channel()["/root/lao1/e1"],
            vec![child.clone()]
        );
        assert_eq!(engine.retry_unprocessed(&ingest).unwrap(), 0);

        engine
            .store_rumor(&ingest, &rumor("C", 0, &[], &[("/root/lao1", parent)]))
            .unwrap();
        assert_eq!(engine.retry_unprocessed(&ingest).unwrap(), 1);
        assert_eq!(engine.unprocessed_count(), 0);
        assert!(repo.has_message(child.id()).unwrap());
    }

    #[test]
    fn test_rumors_missing_from() {
        let fx = Fixture::new();
        let engine = RumorEngine::new("B");
        let a0 = rumor("A", 0, &[], &[("/root/a", message("a0"))]);
        let a1 = rumor("A", 1, &[("A", 0)], &[("/root/a", message("a1"))]);
        let c0 = rumor("C", 0, &[], &[("/root/c", message("c0"))]);
        for r in [&a0, &a1, &c0] {
            engine.store_rumor(&fx.ingest(), r).unwrap();
        }

        let all = engine
            .rumors_missing_from(&RumorTimestamp::new(), &fx.repo)
            .unwrap();
        let keys: Vec<_> = all.iter().map(|r| (r.sender_id.as_str(), r.rumor_id)).collect();
        assert_eq!(keys, vec![("A", 0), ("C", 0), ("A", 1)]);
        assert_eq!(all[2], a1);

        let known: RumorTimestamp = [("A".to_string(), 0)].into_iter().collect();
        let some = engine.rumors_missing_from(&known, &fx.repo).unwrap();
        let keys: Vec<_> = some.iter().map(|r| (r.sender_id.as_str(), r.rumor_id)).collect();
        assert_eq!(keys, vec![("C", 0), ("A", 1)]);
    }

    #[test]
    fn test_concurrent_sealing_keeps_ids_and_messages_unique() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 16;

        let fx = Fixture::new();
        let author = Identity::from_bytes(&[9u8; 32]);
        let mut published = BTreeSet::new();
        for t in 0..THREADS {
            for n in 0..PER_THREAD {
                let m = sign_message(&author, format!("{t}/{n}").as_bytes()).unwrap();
                fx.ingest().accept("/root/lao1", &m).unwrap();
                published.insert(m.id().clone());
            }
        }
        let ids: Vec<MessageId> = published.iter().cloned().collect();
        let engine = RumorEngine::new("A");

        let sealed: Vec<Rumor> = std::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks(PER_THREAD)
                .map(|chunk| {
                    let (engine, repo) = (&engine, &fx.repo);
                    scope.spawn(move || {
                        let mut mine = Vec::new();
                        for id in chunk {
                            engine.add_message_to_my_rumor("/root/lao1", id.clone());
                            if let Some(r) = engine.get_and_increment_my_rumor(repo).unwrap() {
                                mine.push(r);
                            }
                        }
                        mine
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let mut rumor_ids: Vec<RumorId> = sealed.iter().map(|r| r.rumor_id).collect();
        rumor_ids.sort_unstable();
        let expected: Vec<RumorId> = (0..sealed.len() as RumorId).collect();
        assert_eq!(rumor_ids, expected);

        let mut carried = Vec::new();
        for r in &sealed {
            carried.extend(r.messages["/root/lao1"].iter().map(|m| m.id().clone()));
        }
        assert_eq!(carried.len(), ids.len());
        assert_eq!(carried.into_iter().collect::<BTreeSet<_>>(), published);

        assert_eq!(engine.buffered(), 0);
        assert_eq!(engine.rumor_count(), sealed.len());
        assert_eq!(
            engine.rumor_timestamp().get("A"),
            Some(sealed.len() as RumorId - 1)
        );
    }

    struct FailingChannel(&'static str);

    impl ChannelHandler for FailingChannel {
        fn handle_message(
            &self,
            channel: &str,
            message: &Message,
            subscribers: &Subscribers,
        ) -> BrokerResult<()> {
            if channel == self.0 {
                return Err(BrokerError::Internal("storage offline".to_string()));
            }
            AutoCreateChannels.handle_message(channel, message, subscribers)
        }
    }

    #[test]
    fn test_internal_failure_still_merges_rest_of_rumor() {
        let fx = Fixture::new();
        let handler = FailingChannel("/root/broken");
        let ingest = Ingest::new(&fx.repo, &fx.subs, &handler);
        let engine = RumorEngine::new("B");

        let lost = message("lost");
        let kept = message("kept");
        let r = rumor(
            "A",
            0,
            &[],
            &[("/root/broken", lost.clone()), ("/root/ok", kept.clone())],
        );

        let err = engine.store_rumor(&ingest, &r).unwrap_err();
        assert_eq!(err.code(), -6);
        assert!(fx.repo.has_message(kept.id()).unwrap());
        assert!(!fx.repo.has_message(lost.id()).unwrap());
        assert!(engine.check_rumor("A", 0, &r.timestamp).is_duplicate);
    }
}
