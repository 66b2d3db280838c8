//! Tidings Hub - dispatcher and method handlers
//!
//! One hub per server instance. Handlers run inline on the reader task of
//! the connection the frame arrived on; they only ever reach other
//! connections through non-blocking sends.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tidings_core::{
    is_root_channel, validate_channel_path, BrokerError, BrokerResult, QueryId, Rumor,
    ServerInfo, SocketId,
};
use tidings_crypto::{verify_message, Identity};
use tidings_state::{
    collect_requested, merge_messages, missing_ids, AutoCreateChannels, ChannelHandler,
    InMemoryRepository, Ingest, Peers, PeerSockets, Queries, QueryKind, Repository, RumorEngine,
    Subscribers,
};
use tidings_transport::{connect, MessageHandler, SocketRef, SocketType, TcpTransport};
use tidings_wire::{
    Answer, ChannelParams, IdsByChannel, Incoming, MessageParams, Method, RumorStateParams,
};

use crate::HubConfig;

/// Tidings Hub - the runtime of one server
pub struct Hub {
    identity: Identity,
    info: ServerInfo,
    config: HubConfig,
    subscribers: Subscribers,
    peers: Peers,
    peer_sockets: PeerSockets,
    queries: Queries,
    rumors: RumorEngine,
    repository: Arc<dyn Repository>,
    handler: Arc<dyn ChannelHandler>,
    shutdown: watch::Sender<bool>,
}

impl Hub {
    /// Hub with an in-memory repository and auto-created channels
    pub fn new(identity: Identity, config: HubConfig) -> Self {
        Self::with_parts(
            identity,
            config,
            Arc::new(InMemoryRepository::new()),
            Arc::new(AutoCreateChannels),
        )
    }

    pub fn with_parts(
        identity: Identity,
        config: HubConfig,
        repository: Arc<dyn Repository>,
        handler: Arc<dyn ChannelHandler>,
    ) -> Self {
        let info = ServerInfo::new(
            identity.public_key(),
            config.client_address.clone(),
            config.server_address.clone(),
        );
        let rumors = RumorEngine::new(identity.public_key());
        let (shutdown, _) = watch::channel(false);

        Hub {
            identity,
            info,
            config,
            subscribers: Subscribers::new(),
            peers: Peers::new(),
            peer_sockets: PeerSockets::new(),
            queries: Queries::new(),
            rumors,
            repository,
            handler,
            shutdown,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// What this hub announces in `greet_server`
    pub fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    pub fn peers(&self) -> &Peers {
        &self.peers
    }

    pub fn peer_sockets(&self) -> &PeerSockets {
        &self.peer_sockets
    }

    pub fn queries(&self) -> &Queries {
        &self.queries
    }

    pub fn rumors(&self) -> &RumorEngine {
        &self.rumors
    }

    pub fn repository(&self) -> &dyn Repository {
        self.repository.as_ref()
    }

    /// Register a channel so clients can subscribe before its first message
    pub fn register_channel(&self, channel: &str) -> BrokerResult<()> {
        validate_channel_path(channel)?;
        self.subscribers.add_channel(channel)
    }

    fn ingest(&self) -> Ingest<'_> {
        Ingest::new(
            self.repository.as_ref(),
            &self.subscribers,
            self.handler.as_ref(),
        )
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Dispatch one inbound JSON document read from `socket`
    pub fn handle_frame(&self, socket: &SocketRef, frame: &[u8]) {
        let incoming = match Incoming::parse(frame) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!(socket = %socket.id(), "malformed frame: {}", e);
                if let Err(send_err) = socket.send_error(None, &e) {
                    tracing::warn!(socket = %socket.id(), "failed to send error answer: {}", send_err);
                }
                return;
            }
        };

        match incoming {
            Incoming::Query(envelope) => {
                let id = envelope.id;
                let method_name = envelope.method.clone();
                let result = envelope
                    .decode()
                    .and_then(|method| self.handle_query(socket, id, method));
                if let Err(e) = result {
                    self.report(socket, id, &method_name, &e);
                }
            }
            Incoming::Answer(answer) => {
                if let Err(e) = self.handle_answer(socket, answer) {
                    tracing::warn!(socket = %socket.id(), "failed to handle answer: {}", e);
                }
            }
        }
    }

    fn report(&self, socket: &SocketRef, id: Option<QueryId>, method: &str, err: &BrokerError) {
        match id {
            Some(query_id) => {
                tracing::debug!(socket = %socket.id(), query_id, %method, "query failed: {}", err);
                if let Err(send_err) = socket.send_error(id, err) {
                    tracing::warn!(socket = %socket.id(), "failed to send error answer: {}", send_err);
                }
            }
            None => {
                tracing::warn!(socket = %socket.id(), %method, "notification failed: {}", err);
            }
        }
    }

    fn handle_query(
        &self,
        socket: &SocketRef,
        id: Option<QueryId>,
        method: Method,
    ) -> BrokerResult<()> {
        check_allowed(socket.socket_type(), &method)?;

        match method {
            Method::Publish(params) => self.handle_publish(socket, id, params),
            Method::Subscribe(params) => self.handle_subscribe(socket, id, params),
            Method::Unsubscribe(params) => self.handle_unsubscribe(socket, id, params),
            Method::Catchup(params) => self.handle_catchup(socket, id, params),
            Method::Heartbeat(ids) => self.handle_heartbeat(socket, ids),
            Method::GetMessagesById(ids) => self.handle_get_messages_by_id(socket, id, ids),
            Method::GreetServer(info) => self.handle_greet_server(socket, info),
            Method::Rumor(rumor) => self.handle_rumor(socket, rumor),
            Method::RumorState(params) => self.handle_rumor_state(socket, id, params),
            Method::Broadcast(_) => Err(BrokerError::InvalidAction(
                "broadcast is only sent to clients".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Client methods
    // ------------------------------------------------------------------

    fn handle_publish(
        &self,
        socket: &SocketRef,
        id: Option<QueryId>,
        params: MessageParams,
    ) -> BrokerResult<()> {
        let MessageParams { channel, message } = params;
        validate_channel_path(&channel)?;
        verify_message(&message)?;

        if self.repository.has_message(message.id())? {
            return Err(BrokerError::DuplicateResource(format!(
                "message {} was already received",
                message.id()
            )));
        }

        self.ingest().accept(&channel, &message)?;
        tracing::debug!(socket = %socket.id(), %channel, message_id = %message.id(), "published");

        let buffered = self
            .rumors
            .add_message_to_my_rumor(&channel, message.id().clone());
        if buffered >= self.config.rumor_threshold {
            self.try_send_rumor()?;
        }

        socket.send_result(id, Value::from(0))
    }

    fn handle_subscribe(
        &self,
        socket: &SocketRef,
        id: Option<QueryId>,
        params: ChannelParams,
    ) -> BrokerResult<()> {
        if is_root_channel(&params.channel) {
            return Err(BrokerError::InvalidAction(
                "cannot subscribe to the root channel".to_string(),
            ));
        }
        self.subscribers
            .subscribe(&params.channel, socket.clone())
            .map_err(|e| e.context("subscribe"))?;
        socket.send_result(id, Value::from(0))
    }

    fn handle_unsubscribe(
        &self,
        socket: &SocketRef,
        id: Option<QueryId>,
        params: ChannelParams,
    ) -> BrokerResult<()> {
        if is_root_channel(&params.channel) {
            return Err(BrokerError::InvalidAction(
                "cannot unsubscribe from the root channel".to_string(),
            ));
        }
        self.subscribers
            .unsubscribe(&params.channel, socket.id())
            .map_err(|e| e.context("unsubscribe"))?;
        socket.send_result(id, Value::from(0))
    }

    fn handle_catchup(
        &self,
        socket: &SocketRef,
        id: Option<QueryId>,
        params: ChannelParams,
    ) -> BrokerResult<()> {
        validate_channel_path(&params.channel)?;
        let messages = self
            .repository
            .get_all_messages_from_channel(&params.channel)
            .map_err(|e| e.context("catchup"))?;
        socket.send_result(id, to_value(&messages)?)
    }

    // ------------------------------------------------------------------
    // Federation methods
    // ------------------------------------------------------------------

    fn handle_heartbeat(&self, socket: &SocketRef, advertised: IdsByChannel) -> BrokerResult<()> {
        let gap = missing_ids(self.repository.as_ref(), &advertised)?;
        if gap.is_empty() {
            return Ok(());
        }

        let query_id = self.queries.get_next_id();
        let frame = tidings_wire::get_messages_by_id(query_id, gap.clone())?;
        self.queries
            .add_query(query_id, QueryKind::GetMessagesById, to_value(&gap)?);
        tracing::debug!(socket = %socket.id(), query_id, channels = gap.len(), "requesting missing messages");
        socket.send(frame)
    }

    fn handle_get_messages_by_id(
        &self,
        socket: &SocketRef,
        id: Option<QueryId>,
        requested: IdsByChannel,
    ) -> BrokerResult<()> {
        let found = collect_requested(self.repository.as_ref(), &requested)?;
        socket.send_result(id, to_value(&found)?)
    }

    fn handle_greet_server(&self, socket: &SocketRef, info: ServerInfo) -> BrokerResult<()> {
        self.peers.add_peer_info(socket.id(), info.clone())?;
        self.peer_sockets.upsert(socket.clone());
        tracing::info!(socket = %socket.id(), peer = %info.public_key, "peer greeted us");

        if !self.peers.is_peer_greeted(socket.id()) {
            socket.send(tidings_wire::greet_server(&self.info)?)?;
            self.peers.add_peer_greeted(socket.id());
        }
        Ok(())
    }

    fn handle_rumor(&self, socket: &SocketRef, rumor: Rumor) -> BrokerResult<()> {
        let rumor = verified(rumor);
        let check = self
            .rumors
            .check_rumor(&rumor.sender_id, rumor.rumor_id, &rumor.timestamp);

        if check.is_duplicate {
            tracing::trace!(sender = %rumor.sender_id, rumor_id = rumor.rumor_id, "duplicate rumor");
            return Ok(());
        }
        if !check.is_valid {
            tracing::debug!(sender = %rumor.sender_id, rumor_id = rumor.rumor_id, "rumor not causally ready, deferred");
            return Ok(());
        }

        let ingest = self.ingest();
        if !self.rumors.store_rumor(&ingest, &rumor)? {
            return Ok(());
        }

        let frame = tidings_wire::rumor(&rumor)?;
        let forwarded = self.peer_sockets.send_to_all_except(&frame, socket.id());
        tracing::debug!(sender = %rumor.sender_id, rumor_id = rumor.rumor_id, forwarded, "relayed rumor");

        self.rumors.retry_unprocessed(&ingest)?;
        Ok(())
    }

    fn handle_rumor_state(
        &self,
        socket: &SocketRef,
        id: Option<QueryId>,
        params: RumorStateParams,
    ) -> BrokerResult<()> {
        let missing = self
            .rumors
            .rumors_missing_from(&params.state, self.repository.as_ref())?;
        tracing::debug!(socket = %socket.id(), rumors = missing.len(), "answering rumor state");
        socket.send_result(id, to_value(&missing)?)
    }

    // ------------------------------------------------------------------
    // Answers
    // ------------------------------------------------------------------

    fn handle_answer(&self, socket: &SocketRef, answer: Answer) -> BrokerResult<()> {
        let query_id = answer.id.ok_or_else(|| {
            BrokerError::InvalidMessageField("answer without an id".to_string())
        })?;
        let kind = self.queries.get_query_kind(query_id)?;
        self.queries.set_query_received(query_id)?;

        if let Some(error) = &answer.error {
            tracing::warn!(
                socket = %socket.id(),
                query_id,
                code = error.code,
                "peer answered with an error: {}",
                error.description
            );
            return Ok(());
        }

        match kind {
            QueryKind::GetMessagesById => {
                let batch = answer.messages_by_channel()?;
                let outcome = merge_messages(&self.ingest(), &batch)?;
                tracing::debug!(
                    query_id,
                    stored = outcome.stored,
                    duplicates = outcome.duplicates,
                    rejected = outcome.rejected,
                    "merged fetched messages"
                );
            }
            QueryKind::RumorState => {
                let applied = self.apply_rumors(answer.rumors()?)?;
                tracing::debug!(query_id, applied, "applied rumor state answer");
            }
        }
        Ok(())
    }

    /// Apply a batch of rumors in causal order; returns how many were stored
    ///
    /// Passes repeat while at least one rumor became applicable. Rumors
    /// still invalid afterwards stay deferred.
    pub fn apply_rumors(&self, rumors: Vec<Rumor>) -> BrokerResult<usize> {
        let ingest = self.ingest();
        let mut remaining: Vec<Rumor> = rumors.into_iter().map(verified).collect();
        let mut applied = 0;

        loop {
            let mut progress = false;
            let mut deferred = Vec::new();

            for rumor in remaining {
                let check = self
                    .rumors
                    .check_rumor(&rumor.sender_id, rumor.rumor_id, &rumor.timestamp);
                if check.is_duplicate {
                    continue;
                }
                if !check.is_valid {
                    deferred.push(rumor);
                    continue;
                }
                if self.rumors.store_rumor(&ingest, &rumor)? {
                    applied += 1;
                    progress = true;
                }
            }

            remaining = deferred;
            if !progress || remaining.is_empty() {
                break;
            }
        }

        if !remaining.is_empty() {
            tracing::debug!(deferred = remaining.len(), "rumors still not causally ready");
        }
        self.rumors.retry_unprocessed(&ingest)?;
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Outgoing gossip
    // ------------------------------------------------------------------

    /// Seal the rumor buffer and send it to every peer
    ///
    /// Returns `false` if there was nothing to send.
    pub fn try_send_rumor(&self) -> BrokerResult<bool> {
        let Some(rumor) = self
            .rumors
            .get_and_increment_my_rumor(self.repository.as_ref())?
        else {
            return Ok(false);
        };

        let frame = tidings_wire::rumor(&rumor)?;
        let sent = self.peer_sockets.send_to_all(&frame);
        tracing::debug!(rumor_id = rumor.rumor_id, peers = sent, "sent rumor");
        Ok(true)
    }

    /// Advertise every held message id to every peer
    pub fn send_heartbeat(&self) -> BrokerResult<()> {
        let ids = self.repository.get_ids_table()?;
        let frame = tidings_wire::heartbeat(ids)?;
        let sent = self.peer_sockets.send_to_all(&frame);
        tracing::trace!(peers = sent, "sent heartbeat");
        Ok(())
    }

    /// Ask every peer for the rumors our vector clock misses
    pub fn send_rumor_state(&self) -> BrokerResult<()> {
        self.rumors.retry_unprocessed(&self.ingest())?;

        for socket in self.peer_sockets.snapshot() {
            if let Err(e) = self.send_rumor_state_to(&socket) {
                tracing::warn!(socket = %socket.id(), "failed to send rumor state: {}", e);
            }
        }
        Ok(())
    }

    /// Ask one peer for the rumors our vector clock misses
    pub fn send_rumor_state_to(&self, socket: &SocketRef) -> BrokerResult<QueryId> {
        let state = self.rumors.rumor_timestamp();
        let query_id = self.queries.get_next_id();
        let payload = to_value(&state)?;
        let frame = tidings_wire::rumor_state(query_id, state)?;
        self.queries
            .add_query(query_id, QueryKind::RumorState, payload);
        socket.send(frame)?;
        Ok(query_id)
    }

    /// Greet a freshly connected server socket and ask it for rumor history
    pub fn greet_peer(&self, socket: SocketRef) -> BrokerResult<()> {
        socket.send(tidings_wire::greet_server(&self.info)?)?;
        self.peers.add_peer_greeted(socket.id());
        self.peer_sockets.upsert(socket.clone());
        self.send_rumor_state_to(&socket)?;
        Ok(())
    }

    /// Forget everything tied to a closed socket
    pub fn socket_closed(&self, socket_id: &SocketId) {
        let subscriptions = self.subscribers.unsubscribe_from_all(socket_id);
        let was_peer = self.peer_sockets.remove(socket_id).is_some();
        self.peers.remove_peer(socket_id);
        tracing::debug!(socket = %socket_id, subscriptions, was_peer, "socket closed");
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the heartbeat, rumor and rumor-state loops
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(hub.config.heartbeat_interval);
            let mut rumor = tokio::time::interval(hub.config.rumor_interval);
            let mut rumor_state = tokio::time::interval(hub.config.rumor_state_interval);

            tracing::info!(server = %hub.info.public_key, "hub started");
            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        if let Err(e) = hub.send_heartbeat() {
                            tracing::error!("heartbeat failed: {}", e);
                        }
                    }
                    _ = rumor.tick() => {
                        if let Err(e) = hub.try_send_rumor() {
                            tracing::error!("rumor sender failed: {}", e);
                        }
                    }
                    _ = rumor_state.tick() => {
                        if let Err(e) = hub.send_rumor_state() {
                            tracing::error!("rumor state failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!(server = %hub.info.public_key, "hub stopped");
        })
    }

    /// Signal the loops started by `start` to exit
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Accept connections of `socket_type` on `addr`
    pub async fn listen(
        self: &Arc<Self>,
        addr: SocketAddr,
        socket_type: SocketType,
    ) -> BrokerResult<SocketAddr> {
        let transport = TcpTransport::bind(addr, socket_type, self.config.socket_buffer).await?;
        let local = transport.local_addr();
        tokio::spawn(transport.serve(Arc::clone(self)));
        tracing::info!(%local, %socket_type, "listening");
        Ok(local)
    }

    /// Dial another server and greet it
    pub async fn connect_to_peer(self: &Arc<Self>, addr: SocketAddr) -> BrokerResult<SocketRef> {
        let socket = connect(
            addr,
            SocketType::Server,
            self.config.socket_buffer,
            Arc::clone(self),
        )
        .await?;
        self.greet_peer(socket.clone())?;
        Ok(socket)
    }
}

impl MessageHandler for Hub {
    fn handle_message(&self, socket: SocketRef, frame: &[u8]) {
        self.handle_frame(&socket, frame);
    }

    fn on_socket_closed(&self, socket_id: &SocketId) {
        self.socket_closed(socket_id);
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("server", &self.info.public_key)
            .field("peers", &self.peer_sockets.len())
            .finish_non_exhaustive()
    }
}

/// Clients talk to the pub/sub surface, servers to the federation surface
fn check_allowed(socket_type: SocketType, method: &Method) -> BrokerResult<()> {
    let allowed = match socket_type {
        SocketType::Client => matches!(
            method,
            Method::Publish(_) | Method::Subscribe(_) | Method::Unsubscribe(_) | Method::Catchup(_)
        ),
        SocketType::Server => matches!(
            method,
            Method::Publish(_)
                | Method::Heartbeat(_)
                | Method::GetMessagesById(_)
                | Method::GreetServer(_)
                | Method::Rumor(_)
                | Method::RumorState(_)
        ),
    };
    if allowed {
        Ok(())
    } else {
        Err(BrokerError::InvalidAction(format!(
            "method {} is not available to {socket_type} sockets",
            method.name()
        )))
    }
}

/// Drop the rumor's messages that fail verification
fn verified(mut rumor: Rumor) -> Rumor {
    for (channel, messages) in rumor.messages.iter_mut() {
        messages.retain(|message| match verify_message(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%channel, message_id = %message.id(), "dropping invalid rumor message: {}", e);
                false
            }
        });
    }
    rumor.messages.retain(|_, messages| !messages.is_empty());
    rumor
}

fn to_value<T: serde::Serialize + ?Sized>(value: &T) -> BrokerResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| BrokerError::Internal(format!("failed to marshal result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidings_core::Message;
    use tidings_crypto::sign_message;
    use tidings_transport::MemorySocket;

    fn hub() -> Hub {
        Hub::new(Identity::generate(), HubConfig::default())
    }

    fn client(id: &str) -> (Arc<MemorySocket>, SocketRef) {
        let socket = Arc::new(MemorySocket::new(id, SocketType::Client));
        let socket_ref: SocketRef = socket.clone();
        (socket, socket_ref)
    }

    fn server(id: &str) -> (Arc<MemorySocket>, SocketRef) {
        let socket = Arc::new(MemorySocket::new(id, SocketType::Server));
        let socket_ref: SocketRef = socket.clone();
        (socket, socket_ref)
    }

    fn query(id: u64, method: &str, params: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .unwrap()
    }

    fn publish_frame(id: u64, channel: &str, message: &Message) -> Vec<u8> {
        query(id, "publish", json!({"channel": channel, "message": message}))
    }

    fn message(text: &str) -> Message {
        sign_message(&Identity::from_bytes(&[5u8; 32]), text.as_bytes()).unwrap()
    }

    #[test]
    fn test_publish_then_duplicate() {
        let hub = hub();
        let (raw, socket) = client("c1");
        let msg = message("hello");

        hub.handle_frame(&socket, &publish_frame(1, "/root/lao", &msg));
        hub.handle_frame(&socket, &publish_frame(2, "/root/lao", &msg));

        let answers = raw.drain_json();
        assert_eq!(answers[0], json!({"jsonrpc": "2.0", "id": 1, "result": 0}));
        assert_eq!(answers[1]["id"], 2);
        assert_eq!(answers[1]["error"]["code"], -3);
        assert_eq!(hub.rumors().rumor_count(), 1);
    }

    #[test]
    fn test_publish_invalid_message() {
        let hub = hub();
        let (raw, socket) = client("c1");
        let mut msg = message("hello");
        msg.data = message("other").data;

        hub.handle_frame(&socket, &publish_frame(1, "/root/lao", &msg));
        hub.handle_frame(&socket, &publish_frame(2, "/elsewhere", &message("x")));

        let answers = raw.drain_json();
        assert_eq!(answers[0]["error"]["code"], -4);
        assert_eq!(answers[1]["error"]["code"], -2);
    }

    #[test]
    fn test_subscribe_flow() {
        let hub = hub();
        let (raw, socket) = client("c1");

        hub.handle_frame(&socket, &query(1, "subscribe", json!({"channel": "/root/lao"})));
        hub.register_channel("/root/lao").unwrap();
        hub.handle_frame(&socket, &query(2, "subscribe", json!({"channel": "/root/lao"})));
        hub.handle_frame(&socket, &query(3, "subscribe", json!({"channel": "/root"})));
        hub.handle_frame(&socket, &query(4, "unsubscribe", json!({"channel": "/root/lao"})));
        hub.handle_frame(&socket, &query(5, "unsubscribe", json!({"channel": "/root/lao"})));

        let codes: Vec<Value> = raw
            .drain_json()
            .iter()
            .map(|a| a.get("error").map_or(a["result"].clone(), |e| e["code"].clone()))
            .collect();
        assert_eq!(codes, vec![json!(-2), json!(0), json!(-1), json!(0), json!(-1)]);
    }

    #[test]
    fn test_broadcast_and_catchup() {
        let hub = hub();
        let (sub_raw, subscriber) = client("sub");
        let (_, publisher) = client("pub");
        hub.register_channel("/root/lao").unwrap();
        hub.handle_frame(&subscriber, &query(1, "subscribe", json!({"channel": "/root/lao"})));
        sub_raw.drain();

        let (m1, m2) = (message("one"), message("two"));
        hub.handle_frame(&publisher, &publish_frame(1, "/root/lao", &m1));
        hub.handle_frame(&publisher, &publish_frame(2, "/root/lao", &m2));

        let notes = sub_raw.drain_json();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0]["method"], "broadcast");
        assert!(notes[0].get("id").is_none());

        hub.handle_frame(&subscriber, &query(9, "catchup", json!({"channel": "/root/lao"})));
        let answer = &sub_raw.drain_json()[0];
        assert_eq!(answer["result"], json!([m1, m2]));
    }

    #[test]
    fn test_unknown_method_and_garbage() {
        let hub = hub();
        let (raw, socket) = client("c1");
        hub.handle_frame(&socket, &query(1, "elect", json!({})));
        hub.handle_frame(&socket, b"not json at all");
        hub.handle_frame(&socket, br#"{"jsonrpc":"2.0","id":3}"#);

        let answers = raw.drain_json();
        assert_eq!(answers.len(), 3);
        assert_eq!(answers[0]["id"], 1);
        assert_eq!(answers[0]["error"]["code"], -1);
        for malformed in &answers[1..] {
            assert!(malformed["id"].is_null());
            assert_eq!(malformed["error"]["code"], -4);
        }
    }

    #[test]
    fn test_clients_cannot_gossip() {
        let hub = hub();
        let (raw, socket) = client("c1");
        hub.handle_frame(
            &socket,
            &query(1, "rumor_state", json!({"state": {}})),
        );
        assert_eq!(raw.drain_json()[0]["error"]["code"], -1);
    }

    #[test]
    fn test_greet_replies_once() {
        let hub = hub();
        let (raw, socket) = server("s1");
        let greet = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "method": "greet_server",
            "params": {"public_key": "pk", "client_address": "c", "server_address": "s"}
        }))
        .unwrap();

        hub.handle_frame(&socket, &greet);
        hub.handle_frame(&socket, &greet);

        let frames = raw.drain_json();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["method"], "greet_server");
        assert_eq!(frames[0]["params"]["public_key"], hub.server_info().public_key);
        assert_eq!(hub.peer_sockets().len(), 1);
        assert_eq!(hub.peers().get_all_peers_info().len(), 1);
    }

    #[test]
    fn test_greet_peer_requests_rumor_state() {
        let hub = hub();
        let (_, client_socket) = client("c1");
        hub.handle_frame(&client_socket, &publish_frame(1, "/root/lao", &message("m")));

        let (raw, peer) = server("s1");
        hub.greet_peer(peer).unwrap();

        let frames = raw.drain_json();
        let methods: Vec<&str> = frames.iter().filter_map(|f| f["method"].as_str()).collect();
        assert_eq!(methods, vec!["greet_server", "rumor_state"]);

        let request = &frames[1];
        let query_id = request["id"].as_u64().unwrap();
        assert_eq!(request["params"]["state"][&hub.server_info().public_key], 0);
        assert_eq!(hub.queries().get_query_kind(query_id).unwrap(), QueryKind::RumorState);
        assert_eq!(hub.queries().pending_count(), 1);

        let answer = serde_json::to_vec(&json!({"jsonrpc": "2.0", "id": query_id, "result": []}))
            .unwrap();
        let (_, peer_ref) = server("s1");
        hub.handle_frame(&peer_ref, &answer);
        assert_eq!(hub.queries().pending_count(), 0);
    }

    #[test]
    fn test_heartbeat_requests_gap_and_merges_answer() {
        let hub = hub();
        let (raw, socket) = server("s1");
        let (m1, m2, m3) = (message("1"), message("2"), message("3"));
        hub.handle_frame(&socket, &publish_frame(1, "/root/c", &m1));
        raw.drain();

        let heartbeat = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "method": "heartbeat",
            "params": {"/root/c": [m1.message_id, m2.message_id, m3.message_id]}
        }))
        .unwrap();
        hub.handle_frame(&socket, &heartbeat);

        let request = &raw.drain_json()[0];
        assert_eq!(request["method"], "get_messages_by_id");
        assert_eq!(request["params"]["/root/c"], json!([m2.message_id, m3.message_id]));
        let query_id = request["id"].as_u64().unwrap();
        assert_eq!(hub.queries().pending_count(), 1);

        let answer = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "id": query_id,
            "result": {"/root/c": [m2, m3]}
        }))
        .unwrap();
        hub.handle_frame(&socket, &answer);
        hub.handle_frame(&socket, &answer);

        assert_eq!(hub.queries().pending_count(), 0);
        let ids = hub.repository().get_ids_table().unwrap();
        assert_eq!(ids["/root/c"].len(), 3);
    }

    #[test]
    fn test_socket_closed_cleans_up() {
        let hub = hub();
        let (_, socket) = client("c1");
        hub.register_channel("/root/lao").unwrap();
        hub.handle_frame(&socket, &query(1, "subscribe", json!({"channel": "/root/lao"})));
        let (_, peer) = server("s1");
        hub.greet_peer(peer.clone()).unwrap();

        hub.socket_closed(socket.id());
        hub.socket_closed(peer.id());

        assert_eq!(hub.subscribers().subscriber_count("/root/lao"), 0);
        assert!(hub.peer_sockets().is_empty());
        assert!(!hub.peers().is_peer_greeted(peer.id()));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let config = HubConfig::default()
            .with_heartbeat_interval(std::time::Duration::from_millis(10))
            .with_rumor_interval(std::time::Duration::from_millis(10))
            .with_rumor_state_interval(std::time::Duration::from_millis(10));
        let hub = Arc::new(Hub::new(Identity::generate(), config));
        let (raw, peer) = server("s1");
        hub.greet_peer(peer).unwrap();
        raw.drain();

        let handle = hub.start();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        hub.stop();
        handle.await.unwrap();

        let methods: Vec<Value> = raw.drain_json().iter().map(|f| f["method"].clone()).collect();
        assert!(methods.contains(&json!("heartbeat")));
        assert!(methods.contains(&json!("rumor_state")));
    }
}
