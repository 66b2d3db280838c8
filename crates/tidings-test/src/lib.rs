//! Tidings Test Harness - multi-hub convergence testing
//!
//! This crate provides:
//! - An in-process mesh of hubs linked by memory sockets
//! - Partitionable links and manual frame pumping
//! - Test clients that publish, subscribe and collect broadcasts
//! - End-to-end integration testing

pub mod integration;
pub mod mesh;

pub use mesh::*;
