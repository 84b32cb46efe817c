//! Transport-level error types.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Socket-level failures on a streaming connection.
///
/// Every variant is connection-fatal: the owning connection is torn down and
/// every waiter registered on it is rejected. The pool reconnects lazily on the
/// next `watch`.
///
/// # Example
///
/// ```rust
/// use ccxt_stream_core::error::{Error, NetworkError};
///
/// let err = Error::from(NetworkError::NotConnected);
/// assert!(err.is_connection_fatal());
/// ```
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum NetworkError {
    /// The URL is not a valid `ws://` or `wss://` endpoint.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Could not establish the socket.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The handshake did not complete within the configured connect timeout.
    #[error("Connect timeout")]
    ConnectTimeout,

    /// An outbound frame was submitted while the socket was not open.
    #[error("Socket is not open")]
    NotConnected,

    /// Writing a frame to the socket failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The peer closed the socket.
    #[error("Closed by peer (code: {code:?}): {reason}")]
    ClosedByPeer {
        /// Close code, if the peer sent one
        code: Option<u16>,
        /// Close reason text
        reason: String,
    },

    /// Opaque transport error preserving the underlying source.
    #[error("Transport error: {0}")]
    Transport(#[source] Arc<dyn StdError + Send + Sync + 'static>),
}

/// Whether a transport failure may clear up on a fresh connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WsErrorKind {
    /// Network hiccup, peer close, or server-side failure.
    Transient,
    /// Bad URL, protocol violation or rejected handshake.
    Permanent,
}

impl WsErrorKind {
    /// Returns `true` for [`WsErrorKind::Transient`].
    #[inline]
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns `true` for [`WsErrorKind::Permanent`].
    #[inline]
    #[must_use]
    pub fn is_permanent(self) -> bool {
        matches!(self, Self::Permanent)
    }
}

impl std::fmt::Display for WsErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "Transient"),
            Self::Permanent => write!(f, "Permanent"),
        }
    }
}

impl NetworkError {
    /// Classifies this failure.
    #[must_use]
    pub fn kind(&self) -> WsErrorKind {
        match self {
            Self::InvalidUrl(_) | Self::Transport(_) => WsErrorKind::Permanent,
            Self::ConnectionFailed(_)
            | Self::ConnectTimeout
            | Self::NotConnected
            | Self::SendFailed(_)
            | Self::ClosedByPeer { .. } => WsErrorKind::Transient,
        }
    }
}
