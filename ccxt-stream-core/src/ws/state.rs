//! Connection state and statistics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::types::now_ms;

/// Lifecycle state of a [`Connection`](super::Connection).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting = 0,
    /// Socket open, receive loop running
    Open = 1,
    /// Teardown started
    Closing = 2,
    /// Terminal; the pool replaces the connection on the next `get`
    Closed = 3,
}

impl ConnectionState {
    /// Converts a `u8` value to `ConnectionState`.
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Converts the state to its `u8` representation.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for `Connecting` and `Open`.
    #[inline]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Connection statistics (lock-free).
///
/// `last_message_time` and `last_pong_time` double as the liveness signal read
/// by the heartbeat task.
#[derive(Debug, Default)]
pub struct WsStats {
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    parse_failures: AtomicU64,
    last_message_time: AtomicI64,
    last_ping_time: AtomicI64,
    last_pong_time: AtomicI64,
    connected_at: AtomicI64,
}

impl WsStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an inbound frame.
    pub fn record_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.last_message_time.store(now_ms(), Ordering::Relaxed);
    }

    /// Records an outbound frame.
    pub fn record_sent(&self, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records an inbound frame that could not be decoded.
    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a liveness probe.
    pub fn record_ping(&self) {
        self.last_ping_time.store(now_ms(), Ordering::Relaxed);
    }

    /// Records a liveness response.
    pub fn record_pong(&self) {
        self.last_pong_time.store(now_ms(), Ordering::Relaxed);
    }

    /// Records the socket opening. Liveness timestamps start from here.
    pub fn record_connected(&self) {
        let now = now_ms();
        self.connected_at.store(now, Ordering::Relaxed);
        self.last_pong_time.store(now, Ordering::Relaxed);
        self.last_message_time.store(now, Ordering::Relaxed);
    }

    /// Timestamp of the last liveness response.
    pub fn last_pong_time(&self) -> i64 {
        self.last_pong_time.load(Ordering::Relaxed)
    }

    /// Timestamp of the last liveness probe.
    pub fn last_ping_time(&self) -> i64 {
        self.last_ping_time.load(Ordering::Relaxed)
    }

    /// Timestamp of the last inbound frame of any kind.
    pub fn last_message_time(&self) -> i64 {
        self.last_message_time.load(Ordering::Relaxed)
    }

    /// Creates an immutable snapshot of current statistics.
    pub fn snapshot(&self) -> WsStatsSnapshot {
        WsStatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            last_message_time: self.last_message_time.load(Ordering::Relaxed),
            last_ping_time: self.last_ping_time.load(Ordering::Relaxed),
            last_pong_time: self.last_pong_time.load(Ordering::Relaxed),
            connected_at: self.connected_at.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of connection statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WsStatsSnapshot {
    /// Total frames received
    pub messages_received: u64,
    /// Total frames sent
    pub messages_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Frames that failed to decode
    pub parse_failures: u64,
    /// Last inbound frame, milliseconds
    pub last_message_time: i64,
    /// Last liveness probe, milliseconds
    pub last_ping_time: i64,
    /// Last liveness response, milliseconds
    pub last_pong_time: i64,
    /// Socket open time, milliseconds
    pub connected_at: i64,
}

impl WsStatsSnapshot {
    /// Round trip of the last probe, if a response followed it.
    pub fn latency(&self) -> Option<i64> {
        (self.last_ping_time > 0 && self.last_pong_time >= self.last_ping_time)
            .then(|| self.last_pong_time - self.last_ping_time)
    }
}
