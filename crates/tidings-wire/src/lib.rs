//! Tidings Wire Protocol - JSON-RPC 2.0 over line-delimited JSON
//!
//! This crate implements the message envelopes exchanged by clients and
//! servers:
//! - Classification of an inbound payload as query or answer
//! - Typed method parameters (closed `Method` enum)
//! - Answers with results or coded errors

pub mod answer;
pub mod incoming;
pub mod method;

pub use answer::*;
pub use incoming::*;
pub use method::*;

/// Value of the `jsonrpc` member on every envelope
pub const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}
