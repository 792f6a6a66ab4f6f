//! Connection lifecycle
//!
//! A connection aggregates the transactions parsed out of one network
//! session and owns them until they are detached or the connection is
//! dropped.

mod conn;
mod message;

pub use conn::{Conn, ConnInfo, ParserId, TxHandle};
pub use message::{Message, Severity};
