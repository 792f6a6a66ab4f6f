//! Connection aggregate
//!
//! Manages the ordered transaction slots of one network session and
//! their ownership.

use serde::Serialize;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use super::message::Message;
use crate::pool::{AllocError, SlotList};

/// Initial slot reservation for the transaction sequence
const INITIAL_TX_SLOTS: usize = 16;
/// Initial slot reservation for the message sequence
const INITIAL_MSG_SLOTS: usize = 8;

/// Opaque identifier of the parser context that produced a connection
///
/// A weak association: stored for correlation only, never dereferenced
/// and never used to manage the parser's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParserId(u64);

impl ParserId {
    /// Create from raw u64
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ParserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Handle to a transaction slot
///
/// Assigned at append time and valid for the life of the connection.
/// After the slot is detached the handle resolves to nothing, never to
/// a different transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle(usize);

impl TxHandle {
    /// Get the raw slot index
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One network session and the transactions parsed out of it
///
/// The connection exclusively owns every transaction still sitting in
/// its slots. [`Conn::remove_tx`] hands a single transaction back to
/// the caller without disturbing the indices of the others; dropping
/// the connection drops whatever it still owns, exactly once each.
///
/// Single-owner type: all mutation goes through `&mut self`, so the
/// append, detach, and teardown paths cannot race.
pub struct Conn<T> {
    /// Parser context back-reference
    parser: ParserId,
    /// Transaction slots, tombstoned on detach
    transactions: SlotList<T>,
    /// Recorded protocol messages, append-only
    messages: SlotList<Message>,
    /// Client endpoint, recorded by `open`
    client_addr: Option<SocketAddr>,
    /// Server endpoint, recorded by `open`
    server_addr: Option<SocketAddr>,
    /// When the session opened
    opened_at: Option<SystemTime>,
    /// When the session closed
    closed_at: Option<SystemTime>,
    /// Bytes seen client-to-server
    bytes_in: u64,
    /// Bytes seen server-to-client
    bytes_out: u64,
}

impl<T> Conn<T> {
    /// Create a connection with the nominal slot reservations
    pub fn new(parser: ParserId) -> Result<Self, AllocError> {
        Self::with_capacity(parser, INITIAL_TX_SLOTS, INITIAL_MSG_SLOTS)
    }

    /// Create a connection with explicit slot reservations.
    ///
    /// Construction is atomic: if either reservation fails, everything
    /// reserved before it is released on the way out and no partially
    /// built connection is ever returned.
    pub fn with_capacity(
        parser: ParserId,
        tx_slots: usize,
        msg_slots: usize,
    ) -> Result<Self, AllocError> {
        let transactions = SlotList::with_capacity(tx_slots)?;
        let messages = SlotList::with_capacity(msg_slots)?;

        debug!(parser = %parser, "connection created");

        Ok(Self {
            parser,
            transactions,
            messages,
            client_addr: None,
            server_addr: None,
            opened_at: None,
            closed_at: None,
            bytes_in: 0,
            bytes_out: 0,
        })
    }

    /// Get the parser context this connection belongs to
    pub fn parser(&self) -> ParserId {
        self.parser
    }

    /// Record the session endpoints and open timestamp
    pub fn open(&mut self, client_addr: SocketAddr, server_addr: SocketAddr, at: SystemTime) {
        self.client_addr = Some(client_addr);
        self.server_addr = Some(server_addr);
        self.opened_at = Some(at);
        debug!(parser = %self.parser, %client_addr, %server_addr, "connection opened");
    }

    /// Record the close timestamp
    pub fn close(&mut self, at: SystemTime) {
        self.closed_at = Some(at);
        debug!(
            parser = %self.parser,
            live_txs = self.transactions.live(),
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
            "connection closed"
        );
    }

    /// Check whether a close timestamp was recorded
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Register a transaction and return its permanent slot handle.
    ///
    /// The connection owns the transaction from this point until it is
    /// detached with [`Conn::remove_tx`] or the connection is dropped.
    pub fn push_tx(&mut self, tx: T) -> Result<TxHandle, AllocError> {
        let index = self.transactions.push(tx)?;
        trace!(parser = %self.parser, index, "transaction registered");
        Ok(TxHandle(index))
    }

    /// Get the transaction at `handle`; `None` once detached
    pub fn tx(&self, handle: TxHandle) -> Option<&T> {
        self.transactions.get(handle.0)
    }

    /// Mutable access to the transaction at `handle`
    pub fn tx_mut(&mut self, handle: TxHandle) -> Option<&mut T> {
        self.transactions.get_mut(handle.0)
    }

    /// Detach the transaction at `handle`, transferring ownership to
    /// the caller.
    ///
    /// The slot is tombstoned in place: no other slot moves and the
    /// index is never assigned again, so handles held elsewhere stay
    /// meaningful. The connection will neither drop nor report the
    /// detached transaction afterwards. Returns `None` when the slot
    /// was already detached or the handle was never issued by this
    /// connection; nothing is mutated in that case.
    pub fn remove_tx(&mut self, handle: TxHandle) -> Option<T> {
        let tx = self.transactions.take(handle.0)?;
        debug!(parser = %self.parser, index = handle.0, "transaction detached");
        Some(tx)
    }

    /// Total transaction slots, tombstones included
    pub fn tx_slots(&self) -> usize {
        self.transactions.len()
    }

    /// Transactions still owned by the connection
    pub fn tx_live(&self) -> usize {
        self.transactions.live()
    }

    /// Iterate still-owned transactions with their handles, in slot order
    pub fn iter_txs(&self) -> impl Iterator<Item = (TxHandle, &T)> {
        self.transactions
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|tx| (TxHandle(index), tx)))
    }

    /// Record a protocol message against this connection
    pub fn push_msg(&mut self, msg: Message) -> Result<usize, AllocError> {
        trace!(parser = %self.parser, level = ?msg.level, "message recorded");
        self.messages.push(msg)
    }

    /// Iterate recorded messages in append order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter_live()
    }

    /// Number of recorded messages
    pub fn msg_count(&self) -> usize {
        self.messages.len()
    }

    /// Record bytes seen client-to-server
    pub fn track_inbound_data(&mut self, len: u64) {
        self.bytes_in = self.bytes_in.saturating_add(len);
    }

    /// Record bytes seen server-to-client
    pub fn track_outbound_data(&mut self, len: u64) {
        self.bytes_out = self.bytes_out.saturating_add(len);
    }

    /// Bytes seen client-to-server so far
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Bytes seen server-to-client so far
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Client endpoint, when recorded
    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Server endpoint, when recorded
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }

    /// Convert to serializable info
    pub fn info(&self) -> ConnInfo {
        ConnInfo {
            parser: format!("{}", self.parser),
            client_addr: self.client_addr.map(|a| a.to_string()),
            server_addr: self.server_addr.map(|a| a.to_string()),
            tx_slots: self.transactions.len(),
            tx_live: self.transactions.live(),
            messages: self.messages.len(),
            bytes_in: self.bytes_in,
            bytes_out: self.bytes_out,
            opened_unix: unix_secs(self.opened_at),
            closed_unix: unix_secs(self.closed_at),
        }
    }
}

impl<T> Drop for Conn<T> {
    fn drop(&mut self) {
        // Still-owned transactions go down with the connection: the
        // slot list drops each live value exactly once, in slot order,
        // skipping tombstones left by earlier detaches.
        debug!(
            parser = %self.parser,
            live_txs = self.transactions.live(),
            "connection dropped"
        );
    }
}

fn unix_secs(at: Option<SystemTime>) -> Option<u64> {
    at.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

/// Serializable connection information for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ConnInfo {
    /// Parser context id (hex string)
    pub parser: String,
    /// Client IP:port, when recorded
    pub client_addr: Option<String>,
    /// Server IP:port, when recorded
    pub server_addr: Option<String>,
    /// Total transaction slots, tombstones included
    pub tx_slots: usize,
    /// Transactions still owned by the connection
    pub tx_live: usize,
    /// Recorded protocol messages
    pub messages: usize,
    /// Bytes seen client-to-server
    pub bytes_in: u64,
    /// Bytes seen server-to-client
    pub bytes_out: u64,
    /// Open timestamp, seconds since the Unix epoch
    pub opened_unix: Option<u64>,
    /// Close timestamp, seconds since the Unix epoch
    pub closed_unix: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Severity;

    #[test]
    fn test_connection_lifecycle() {
        let mut conn: Conn<String> = Conn::new(ParserId::from_raw(7)).unwrap();

        let client = "10.0.0.1:50000".parse().unwrap();
        let server = "10.0.0.2:80".parse().unwrap();
        conn.open(client, server, SystemTime::now());

        let h0 = conn.push_tx("GET /".to_string()).unwrap();
        let h1 = conn.push_tx("POST /submit".to_string()).unwrap();
        assert_eq!(h0.index(), 0);
        assert_eq!(h1.index(), 1);
        assert_eq!(conn.tx_live(), 2);

        conn.track_inbound_data(512);
        conn.track_outbound_data(2048);

        conn.close(SystemTime::now());
        assert!(conn.is_closed());
        assert_eq!(conn.bytes_in(), 512);
        assert_eq!(conn.bytes_out(), 2048);
    }

    #[test]
    fn test_remove_tx_single_detach() {
        let mut conn: Conn<u32> = Conn::new(ParserId::from_raw(1)).unwrap();

        let h0 = conn.push_tx(100).unwrap();
        let h1 = conn.push_tx(200).unwrap();
        let h2 = conn.push_tx(300).unwrap();

        // The detach hands back the transaction itself, by value
        let detached: u32 = conn.remove_tx(h1).unwrap();
        assert_eq!(detached, 200);

        // Second detach of the same slot finds nothing and mutates nothing
        assert!(conn.remove_tx(h1).is_none());
        assert_eq!(conn.tx_slots(), 3);
        assert_eq!(conn.tx_live(), 2);

        // Untouched slots keep their identity
        assert_eq!(conn.tx(h0), Some(&100));
        assert_eq!(conn.tx(h1), None);
        assert_eq!(conn.tx(h2), Some(&300));
    }

    #[test]
    fn test_detached_slot_never_reused() {
        let mut conn: Conn<u32> = Conn::new(ParserId::from_raw(1)).unwrap();

        let h0 = conn.push_tx(1).unwrap();
        conn.remove_tx(h0).unwrap();

        let h1 = conn.push_tx(2).unwrap();
        assert_eq!(h1.index(), 1);
        assert_eq!(conn.tx(h0), None);
    }

    #[test]
    fn test_construction_failure_is_atomic() {
        // Transaction sequence reservation fails
        let result = Conn::<u32>::with_capacity(ParserId::from_raw(1), usize::MAX, 8);
        assert!(result.is_err());

        // Message sequence reservation fails after the transaction one
        // succeeded; the half-built state unwinds
        let result = Conn::<u32>::with_capacity(ParserId::from_raw(1), 16, usize::MAX);
        assert!(result.is_err());
    }

    #[test]
    fn test_messages_append_in_order() {
        let mut conn: Conn<u32> = Conn::new(ParserId::from_raw(1)).unwrap();

        conn.push_msg(Message::new(Severity::Info, "request line seen"))
            .unwrap();
        conn.push_msg(Message::new(Severity::Warning, "folded header"))
            .unwrap();

        let texts: Vec<&str> = conn.messages().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["request line seen", "folded header"]);
        assert_eq!(conn.msg_count(), 2);
    }

    #[test]
    fn test_byte_counters_saturate() {
        let mut conn: Conn<u32> = Conn::new(ParserId::from_raw(1)).unwrap();

        conn.track_inbound_data(u64::MAX);
        conn.track_inbound_data(1);
        assert_eq!(conn.bytes_in(), u64::MAX);
    }

    #[test]
    fn test_iter_txs_skips_tombstones() {
        let mut conn: Conn<u32> = Conn::new(ParserId::from_raw(1)).unwrap();

        let _h0 = conn.push_tx(10).unwrap();
        let h1 = conn.push_tx(20).unwrap();
        let _h2 = conn.push_tx(30).unwrap();
        conn.remove_tx(h1).unwrap();

        let live: Vec<(usize, u32)> = conn
            .iter_txs()
            .map(|(handle, tx)| (handle.index(), *tx))
            .collect();
        assert_eq!(live, vec![(0, 10), (2, 30)]);
    }
}
