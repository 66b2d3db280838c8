//! Tidings State Engine - replication state of one server
//!
//! This crate implements the registries and engines a hub is built from:
//! - Subscription registry and channel fan-out
//! - Peer registry and the set of peer sockets
//! - Query correlation for outstanding peer queries
//! - Message repository and ingestion
//! - Rumor gossip with vector clocks
//! - Heartbeat / get_messages_by_id reconciliation

pub mod handler;
pub mod ingest;
pub mod peers;
pub mod queries;
pub mod reconcile;
pub mod repository;
pub mod rumor;
pub mod sockets;
pub mod subscribers;

pub use handler::*;
pub use ingest::*;
pub use peers::*;
pub use queries::*;
pub use reconcile::*;
pub use repository::*;
pub use rumor::*;
pub use sockets::*;
pub use subscribers::*;
