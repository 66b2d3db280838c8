//! In-process mesh of hubs
//!
//! Hubs are linked pairwise by two memory sockets. Nothing moves until
//! `pump` is called; it delivers queued frames across every link that is
//! up, in a seeded random link order, until the mesh is quiet. Frames
//! queued on a link that is down are lost.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{json, Value};

use tidings_core::{BrokerResult, Message, MessageId};
use tidings_crypto::Identity;
use tidings_runtime::{Hub, HubConfig};
use tidings_state::{AutoCreateChannels, ChannelHandler, InMemoryRepository};
use tidings_transport::{MemorySocket, SocketRef, SocketType};

/// Upper bound on delivery rounds of one `pump`
const MAX_PUMP_ROUNDS: usize = 1_000;

/// Link between two hubs
struct Link {
    a: usize,
    b: usize,
    /// Socket hub `a` writes to reach `b`
    a_side: Arc<MemorySocket>,
    /// Socket hub `b` writes to reach `a`
    b_side: Arc<MemorySocket>,
    up: bool,
}

/// Mesh of hubs for convergence testing
pub struct Mesh {
    hubs: Vec<Arc<Hub>>,
    links: Vec<Link>,
    rng: StdRng,
    delivered: u64,
    dropped: u64,
}

impl Mesh {
    /// `count` hubs with default channel semantics
    pub fn new(count: usize) -> Self {
        Self::with_handler(count, 0, Arc::new(AutoCreateChannels))
    }

    /// `count` hubs sharing `handler`, link order seeded by `seed`
    pub fn with_handler(count: usize, seed: u64, handler: Arc<dyn ChannelHandler>) -> Self {
        let hubs = (0..count)
            .map(|i| {
                let config = HubConfig::default().with_addresses(
                    format!("ws://hub{i}/client"),
                    format!("ws://hub{i}/server"),
                );
                Arc::new(Hub::with_parts(
                    Identity::generate(),
                    config,
                    Arc::new(InMemoryRepository::new()),
                    handler.clone(),
                ))
            })
            .collect();

        Mesh {
            hubs,
            links: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            delivered: 0,
            dropped: 0,
        }
    }

    pub fn hub(&self, index: usize) -> &Arc<Hub> {
        &self.hubs[index]
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }

    /// Link hub `a` to hub `b`; `a` greets first
    pub fn connect(&mut self, a: usize, b: usize) -> BrokerResult<()> {
        let a_side = Arc::new(MemorySocket::new(format!("hub{a}->hub{b}"), SocketType::Server));
        let b_side = Arc::new(MemorySocket::new(format!("hub{b}->hub{a}"), SocketType::Server));
        self.hubs[a].greet_peer(a_side.clone())?;
        self.links.push(Link {
            a,
            b,
            a_side,
            b_side,
            up: true,
        });
        Ok(())
    }

    /// Link every pair of hubs
    pub fn connect_all(&mut self) -> BrokerResult<()> {
        for a in 0..self.hubs.len() {
            for b in a + 1..self.hubs.len() {
                self.connect(a, b)?;
            }
        }
        Ok(())
    }

    /// Cut or restore the link between `a` and `b`
    pub fn set_link(&mut self, a: usize, b: usize, up: bool) {
        for link in &mut self.links {
            if (link.a, link.b) == (a, b) || (link.a, link.b) == (b, a) {
                link.up = up;
            }
        }
    }

    /// Deliver frames until no link carries any; returns frames delivered
    pub fn pump(&mut self) -> u64 {
        let before = self.delivered;
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut order: Vec<usize> = (0..self.links.len()).collect();
            order.shuffle(&mut self.rng);

            let mut moved = false;
            for index in order {
                moved |= self.deliver(index);
            }
            if !moved {
                break;
            }
        }
        self.delivered - before
    }

    fn deliver(&mut self, index: usize) -> bool {
        let link = &self.links[index];
        let to_b = link.a_side.drain();
        let to_a = link.b_side.drain();
        if to_b.is_empty() && to_a.is_empty() {
            return false;
        }

        let count = (to_b.len() + to_a.len()) as u64;
        if !link.up {
            self.dropped += count;
            return true;
        }

        let a_socket: SocketRef = link.a_side.clone();
        let b_socket: SocketRef = link.b_side.clone();
        let (hub_a, hub_b) = (self.hubs[link.a].clone(), self.hubs[link.b].clone());

        for frame in to_b {
            hub_b.handle_frame(&b_socket, &frame);
        }
        for frame in to_a {
            hub_a.handle_frame(&a_socket, &frame);
        }
        self.delivered += count;
        true
    }

    /// Frames delivered so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Frames lost on cut links so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Every hub sends a heartbeat, then the mesh is pumped
    pub fn heartbeat_round(&mut self) -> BrokerResult<u64> {
        for hub in &self.hubs {
            hub.send_heartbeat()?;
        }
        Ok(self.pump())
    }

    /// Every hub sends a rumor state query, then the mesh is pumped
    pub fn rumor_state_round(&mut self) -> BrokerResult<u64> {
        for hub in &self.hubs {
            hub.send_rumor_state()?;
        }
        Ok(self.pump())
    }

    /// Sorted message ids `hub` holds on `channel`
    pub fn ids(&self, hub: usize, channel: &str) -> Vec<MessageId> {
        let mut ids = self.hubs[hub]
            .repository()
            .get_ids_table()
            .ok()
            .and_then(|mut table| table.remove(channel))
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Do all hubs hold the same ids on `channel`?
    pub fn converged(&self, channel: &str) -> bool {
        let first = self.ids(0, channel);
        (1..self.hubs.len()).all(|i| self.ids(i, channel) == first)
    }

    /// A client connected to hub `index`
    pub fn client(&self, index: usize, name: &str) -> TestClient {
        TestClient::new(self.hubs[index].clone(), name)
    }
}

/// Client attached directly to a hub
pub struct TestClient {
    hub: Arc<Hub>,
    socket: Arc<MemorySocket>,
    next_id: u64,
    inbox: Vec<Value>,
}

impl TestClient {
    pub fn new(hub: Arc<Hub>, name: &str) -> Self {
        TestClient {
            hub,
            socket: Arc::new(MemorySocket::new(name, SocketType::Client)),
            next_id: 1,
            inbox: Vec::new(),
        }
    }

    pub fn socket(&self) -> SocketRef {
        self.socket.clone()
    }

    /// Send a query and return its answer
    pub fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let frame = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let socket = self.socket();
        self.hub.handle_frame(&socket, frame.to_string().as_bytes());
        self.collect();

        let position = self
            .inbox
            .iter()
            .position(|f| f.get("id") == Some(&Value::from(id)) && f.get("method").is_none());
        match position {
            Some(i) => self.inbox.remove(i),
            None => Value::Null,
        }
    }

    pub fn publish(&mut self, channel: &str, message: &Message) -> Value {
        self.call("publish", json!({"channel": channel, "message": message}))
    }

    pub fn subscribe(&mut self, channel: &str) -> Value {
        self.call("subscribe", json!({"channel": channel}))
    }

    pub fn catchup(&mut self, channel: &str) -> Value {
        self.call("catchup", json!({"channel": channel}))
    }

    /// Messages received through `broadcast` on `channel`
    pub fn broadcasts(&mut self, channel: &str) -> Vec<Message> {
        self.collect();
        self.inbox
            .iter()
            .filter(|f| f["method"] == "broadcast" && f["params"]["channel"] == channel)
            .filter_map(|f| serde_json::from_value(f["params"]["message"].clone()).ok())
            .collect()
    }

    fn collect(&mut self) {
        self.inbox.extend(self.socket.drain_json());
    }
}

/// Whether an answer is the conventional `result: 0`
pub fn is_ok(answer: &Value) -> bool {
    answer.get("result") == Some(&Value::from(0))
}

/// Error code of an answer, if it failed
pub fn error_code(answer: &Value) -> Option<i64> {
    answer.get("error").and_then(|e| e["code"].as_i64())
}
