//! Query correlator
//!
//! Server-to-server queries get ids from a per-hub counter; answers are
//! matched back by id. Lifecycle: Created (id handed out) -> Pending
//! (registered) -> Resolved. Pending queries never expire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use tidings_core::{BrokerError, BrokerResult, QueryId};

/// What an outstanding query asked for, used to route its answer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    GetMessagesById,
    RumorState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryState {
    Pending,
    Resolved,
}

#[derive(Clone, Debug)]
pub struct PendingQuery {
    pub id: QueryId,
    pub kind: QueryKind,
    pub payload: Value,
    pub state: QueryState,
}

#[derive(Default)]
pub struct Queries {
    next_id: AtomicU64,
    queries: RwLock<HashMap<QueryId, PendingQuery>>,
}

impl Queries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh query id, never handed out twice
    pub fn get_next_id(&self) -> QueryId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a sent query as pending
    pub fn add_query(&self, id: QueryId, kind: QueryKind, payload: Value) {
        self.queries.write().insert(
            id,
            PendingQuery {
                id,
                kind,
                payload,
                state: QueryState::Pending,
            },
        );
    }

    /// Mark a query answered; answering twice is harmless
    pub fn set_query_received(&self, id: QueryId) -> BrokerResult<()> {
        let mut queries = self.queries.write();
        let query = queries.get_mut(&id).ok_or_else(|| unknown(id))?;
        if query.state == QueryState::Resolved {
            tracing::debug!(query_id = id, "query already resolved");
        }
        query.state = QueryState::Resolved;
        Ok(())
    }

    pub fn get_query_state(&self, id: QueryId) -> BrokerResult<QueryState> {
        self.queries
            .read()
            .get(&id)
            .map(|q| q.state)
            .ok_or_else(|| unknown(id))
    }

    pub fn get_query_kind(&self, id: QueryId) -> BrokerResult<QueryKind> {
        self.queries
            .read()
            .get(&id)
            .map(|q| q.kind)
            .ok_or_else(|| unknown(id))
    }

    pub fn get_query(&self, id: QueryId) -> Option<PendingQuery> {
        self.queries.read().get(&id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.queries
            .read()
            .values()
            .filter(|q| q.state == QueryState::Pending)
            .count()
    }
}

fn unknown(id: QueryId) -> BrokerError {
    BrokerError::NotFound(format!("query {id} does not exist"))
}
