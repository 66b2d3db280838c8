//! Tidings Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every Tidings component:
//! - Identifiers (MessageId, SocketId)
//! - Channel paths
//! - Signed messages
//! - Rumors and their vector-clock timestamps
//! - Peer server information
//! - The error taxonomy and its JSON-RPC error codes

pub mod channel;
pub mod error;
pub mod id;
pub mod message;
pub mod peer;
pub mod rumor;

pub use channel::*;
pub use error::*;
pub use id::*;
pub use message::*;
pub use peer::*;
pub use rumor::*;
