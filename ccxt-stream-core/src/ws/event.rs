//! Connection lifecycle events.

use std::sync::Arc;
use std::time::Duration;

/// Lifecycle events emitted by connections and the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Handshake started.
    Connecting {
        /// Endpoint
        url: String,
    },
    /// Socket open.
    Connected {
        /// Endpoint
        url: String,
    },
    /// Recorded subscribe frames were replayed onto a replacement socket.
    Resubscribed {
        /// Endpoint
        url: String,
        /// Number of frames replayed
        count: usize,
    },
    /// No liveness response within the heartbeat window.
    HeartbeatTimeout {
        /// Endpoint
        url: String,
        /// Elapsed time since the last sign of life
        elapsed: Duration,
    },
    /// The pool is waiting before reconnecting after consecutive failures.
    Backoff {
        /// Endpoint
        url: String,
        /// Consecutive failures so far
        attempt: u32,
        /// Delay before the next attempt
        delay: Duration,
    },
    /// Socket closed and every waiter rejected.
    Closed {
        /// Endpoint
        url: String,
        /// Reason reported to waiters
        reason: String,
    },
}

impl ConnectionEvent {
    /// The endpoint the event concerns.
    pub fn url(&self) -> &str {
        match self {
            Self::Connecting { url }
            | Self::Connected { url }
            | Self::Resubscribed { url, .. }
            | Self::HeartbeatTimeout { url, .. }
            | Self::Backoff { url, .. }
            | Self::Closed { url, .. } => url,
        }
    }

    /// Returns `true` if this is a Closed event.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

impl std::fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting { url } => write!(f, "Connecting to {url}"),
            Self::Connected { url } => write!(f, "Connected to {url}"),
            Self::Resubscribed { url, count } => write!(f, "Resubscribed {count} streams on {url}"),
            Self::HeartbeatTimeout { url, elapsed } => {
                write!(f, "Heartbeat timeout on {url} after {elapsed:?}")
            }
            Self::Backoff {
                url,
                attempt,
                delay,
            } => write!(f, "Backing off {delay:?} before attempt {attempt} on {url}"),
            Self::Closed { url, reason } => write!(f, "Closed {url}: {reason}"),
        }
    }
}

/// Event callback function type.
pub type ConnectionEventCallback = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;
