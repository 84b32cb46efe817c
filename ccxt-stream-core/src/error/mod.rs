//! # Error handling
//!
//! One error type flows through the whole streaming core. It is `Clone` because a
//! single rejection is fanned out to every waiter registered on a message hash.
//!
//! ## Error hierarchy
//!
//! ```text
//! Error
//! ├── Transport         - socket-level failure (via NetworkError), connection-fatal
//! ├── Timeout           - heartbeat/liveness failure, connection-fatal
//! ├── ConnectionClosed  - connection torn down by the pool or by shutdown
//! ├── Authentication    - credential challenge rejected (private channels only)
//! ├── Exchange          - well-formed error frame from the exchange
//! ├── OutOfSync         - sequence gap or checksum mismatch in a book
//! ├── Parse             - inbound frame could not be decoded (via ParseError)
//! ├── InvalidRequest    - caller supplied bad arguments
//! ├── ResourceExhausted - a configured capacity was reached
//! ├── Cancelled         - operation cancelled through a CancellationToken
//! └── Context           - error with additional context
//! ```
//!
//! ## Propagation
//!
//! ```rust
//! use ccxt_stream_core::error::Error;
//!
//! let err = Error::timeout("no pong within 30000ms").context("watch orders");
//! assert!(err.is_connection_fatal());
//! assert!(err.as_timeout().is_some());
//!
//! let err = Error::exchange("10001", "Invalid channel");
//! assert!(!err.is_connection_fatal());
//! ```

mod context;
mod convert;
mod details;
mod network;
mod parse;

use std::borrow::Cow;
use std::error::Error as StdError;
use thiserror::Error;

pub use context::ContextExt;
pub(crate) use convert::truncate_message;
pub use details::{ExchangeErrorDetails, OutOfSyncDetails, OutOfSyncReason};
pub use network::{NetworkError, WsErrorKind};
pub use parse::ParseError;

/// Result type alias for all streaming operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type of the streaming core.
///
/// Large variants are boxed and messages use `Cow<'static, str>` so static
/// strings do not allocate.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Socket-level failure. Boxed to keep the enum small.
    #[error("Transport error: {0}")]
    Transport(Box<NetworkError>),

    /// Heartbeat or liveness failure.
    #[error("Timeout: {0}")]
    Timeout(Cow<'static, str>),

    /// The connection was closed while the caller was waiting.
    #[error("Connection closed: {0}")]
    ConnectionClosed(Cow<'static, str>),

    /// Credential challenge rejected by the exchange.
    #[error("Authentication error: {0}")]
    Authentication(Cow<'static, str>),

    /// Error frame from the exchange, carrying its code and message.
    #[error("Exchange error: {0}")]
    Exchange(Box<ExchangeErrorDetails>),

    /// Order book integrity lost; the adapter must fetch a fresh snapshot.
    #[error("Order book out of sync: {0}")]
    OutOfSync(Box<OutOfSyncDetails>),

    /// Inbound frame could not be decoded.
    #[error("Parse error: {0}")]
    Parse(Box<ParseError>),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    /// A configured limit was reached (subscriptions, pending fills).
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(Cow<'static, str>),

    /// Operation was cancelled.
    #[error("Cancelled: {0}")]
    Cancelled(Cow<'static, str>),

    /// Error with additional context, preserving the error chain.
    #[error("{context}")]
    Context {
        /// Context message describing what operation failed
        context: String,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    // ==================== Constructor Methods ====================

    /// Creates a transport error from a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(Box::new(NetworkError::ConnectionFailed(msg.into())))
    }

    /// Creates a timeout error.
    pub fn timeout(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a connection-closed error.
    pub fn connection_closed(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::ConnectionClosed(msg.into())
    }

    /// Creates an authentication error.
    pub fn authentication(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Creates an exchange protocol error.
    ///
    /// ```rust
    /// use ccxt_stream_core::error::Error;
    ///
    /// let err = Error::exchange("400", "Bad Request");
    /// assert_eq!(err.as_exchange().map(|d| d.code.as_str()), Some("400"));
    /// ```
    pub fn exchange(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exchange(Box::new(ExchangeErrorDetails::new(code, message)))
    }

    /// Creates an exchange protocol error carrying the raw frame.
    pub fn exchange_with_data(
        code: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::Exchange(Box::new(ExchangeErrorDetails::with_data(code, message, data)))
    }

    /// Creates an out-of-sync error for a book.
    pub fn out_of_sync(symbol: impl Into<String>, reason: OutOfSyncReason) -> Self {
        Self::OutOfSync(Box::new(OutOfSyncDetails {
            symbol: symbol.into(),
            reason,
        }))
    }

    /// Creates an invalid request error.
    pub fn invalid_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a resource exhausted error.
    pub fn resource_exhausted(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Creates a cancelled error.
    pub fn cancelled(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Cancelled(msg.into())
    }

    // ==================== Context Methods ====================

    /// Attaches context to an existing error.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    // ==================== Chain Traversal Methods ====================

    fn iter_chain(&self) -> impl Iterator<Item = &Error> {
        std::iter::successors(Some(self), |err| match err {
            Error::Context { source, .. } => Some(source.as_ref()),
            _ => None,
        })
    }

    /// Returns the root cause of the error, skipping Context layers.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        self.iter_chain().last().unwrap_or(self)
    }

    /// Generates a report with the full source chain.
    ///
    /// ```rust
    /// use ccxt_stream_core::error::Error;
    ///
    /// let err = Error::transport("connection refused").context("open wss://stream");
    /// assert!(err.report().contains("Caused by: Transport error"));
    /// ```
    #[must_use]
    pub fn report(&self) -> String {
        use std::fmt::Write;
        let mut report = self.to_string();
        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(err) = current {
            let _ = write!(report, "\nCaused by: {err}");
            current = err.source();
        }
        report
    }

    // ==================== Classification (Context Penetrating) ====================

    /// Returns `true` for errors that tear down the connection and reject
    /// every waiter on it: transport failures, heartbeat timeouts, and closes.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::Transport(_) | Error::Timeout(_) | Error::ConnectionClosed(_)
        )
    }

    /// Returns `true` when a fresh `watch` may succeed: the pool replaces a dead
    /// connection on the next call.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.root_cause() {
            Error::Transport(ne) => ne.kind().is_transient(),
            Error::Timeout(_) | Error::ConnectionClosed(_) | Error::OutOfSync(_) => true,
            _ => false,
        }
    }

    /// Returns the timeout message (penetrates Context layers).
    #[must_use]
    pub fn as_timeout(&self) -> Option<&str> {
        match self.root_cause() {
            Error::Timeout(msg) => Some(msg.as_ref()),
            _ => None,
        }
    }

    /// Returns the transport failure (penetrates Context layers).
    #[must_use]
    pub fn as_transport(&self) -> Option<&NetworkError> {
        match self.root_cause() {
            Error::Transport(ne) => Some(ne.as_ref()),
            _ => None,
        }
    }

    /// Returns the close message (penetrates Context layers).
    #[must_use]
    pub fn as_connection_closed(&self) -> Option<&str> {
        match self.root_cause() {
            Error::ConnectionClosed(msg) => Some(msg.as_ref()),
            _ => None,
        }
    }

    /// Returns the authentication message (penetrates Context layers).
    #[must_use]
    pub fn as_authentication(&self) -> Option<&str> {
        match self.root_cause() {
            Error::Authentication(msg) => Some(msg.as_ref()),
            _ => None,
        }
    }

    /// Returns the exchange error details (penetrates Context layers).
    #[must_use]
    pub fn as_exchange(&self) -> Option<&ExchangeErrorDetails> {
        match self.root_cause() {
            Error::Exchange(details) => Some(details.as_ref()),
            _ => None,
        }
    }

    /// Returns the out-of-sync details (penetrates Context layers).
    #[must_use]
    pub fn as_out_of_sync(&self) -> Option<&OutOfSyncDetails> {
        match self.root_cause() {
            Error::OutOfSync(details) => Some(details.as_ref()),
            _ => None,
        }
    }

    /// Returns the cancellation message (penetrates Context layers).
    #[must_use]
    pub fn as_cancelled(&self) -> Option<&str> {
        match self.root_cause() {
            Error::Cancelled(msg) => Some(msg.as_ref()),
            _ => None,
        }
    }

    /// Returns the resource-exhausted message (penetrates Context layers).
    #[must_use]
    pub fn as_resource_exhausted(&self) -> Option<&str> {
        match self.root_cause() {
            Error::ResourceExhausted(msg) => Some(msg.as_ref()),
            _ => None,
        }
    }
}
