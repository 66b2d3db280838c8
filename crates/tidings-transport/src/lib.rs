//! Tidings Transport Layer - sockets and connection tasks
//!
//! This crate provides:
//! - The `Socket` capability handlers reply and fan out through
//! - An in-memory socket for tests and in-process meshes
//! - A bounded channel socket drained by a writer task
//! - Line-delimited JSON over TCP

pub mod channel;
pub mod memory;
pub mod socket;
pub mod tcp;

pub use channel::*;
pub use memory::*;
pub use socket::*;
pub use tcp::*;

/// Default number of frames buffered per connection
pub const DEFAULT_SOCKET_BUFFER: usize = 256;

/// Longest frame a connection accepts before it is dropped
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;
