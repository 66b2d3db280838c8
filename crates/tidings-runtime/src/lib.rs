//! Tidings Runtime - one broker server
//!
//! A `Hub` owns every registry of a server instance and implements the
//! JSON-RPC methods:
//! - Client methods: publish, subscribe, unsubscribe, catchup
//! - Federation: greet_server, rumor, rumor_state, heartbeat,
//!   get_messages_by_id
//! - Periodic heartbeat, rumor and rumor-state tasks

pub mod config;
pub mod hub;
pub mod logging;

pub use config::*;
pub use hub::*;
pub use logging::*;
