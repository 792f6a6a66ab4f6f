//! FlowParse - connection and transaction lifecycle core
//!
//! This library provides the ownership bookkeeping for a streaming
//! protocol parser: each network session is a [`Conn`] aggregate that
//! owns the transactions parsed out of it until they are detached by
//! an external owner or the connection itself is dropped.

pub mod connection;
pub mod pool;

pub use connection::{Conn, ConnInfo, Message, ParserId, Severity, TxHandle};
pub use pool::{AllocError, SlotList};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
