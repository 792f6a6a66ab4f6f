//! Recorded protocol messages

use bytes::Bytes;
use serde::Serialize;

/// Severity of a recorded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// Informational note from the parser
    Info,
    /// Recoverable protocol irregularity
    Warning,
    /// Unrecoverable protocol violation
    Error,
}

/// One message recorded against a connection
///
/// Inert owned data from the connection's point of view: records are
/// appended while parsing and only ever read back, never interpreted.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Severity assigned by the producer
    pub level: Severity,
    /// Human-readable description
    pub text: String,
    /// Raw excerpt of the input the message refers to, when available
    pub data: Option<Bytes>,
}

impl Message {
    /// Create a message without a raw excerpt
    pub fn new(level: Severity, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            data: None,
        }
    }

    /// Attach a raw input excerpt
    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }
}
