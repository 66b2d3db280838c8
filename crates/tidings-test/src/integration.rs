//! End-to-end Integration Test Suite
//!
//! Tests that verify the complete federation flow:
//! - Rumor propagation and relay across hubs
//! - Causally premature rumors and their recovery through rumor state
//! - Heartbeat reconciliation after partitions
//! - The full stack over TCP

use tidings_core::Message;
use tidings_crypto::{sign_message, Identity};

/// Publisher used by the scenarios
pub fn author() -> Identity {
    Identity::from_bytes(&[42u8; 32])
}

/// A signed message with a distinct payload per `n`
pub fn numbered_message(author: &Identity, n: u32) -> Message {
    sign_message(author, format!("{{\"n\":{n}}}").as_bytes())
        .unwrap_or_else(|e| panic!("signing message {n}: {e}"))
}
