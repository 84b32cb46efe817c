//! Contract between the transport core and an exchange adapter.
//!
//! An adapter tells the connection how to probe liveness, how to recognize
//! error frames, and which handler owns each inbound frame. Handlers are
//! declared up front in a [`HandlerMap`] keyed by [`StreamKind`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::connection::Connection;
use super::dispatch::DispatchContext;
use super::subscription::SubscriptionRecord;
use crate::error::{Error, Result};

/// Kind of stream an inbound frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Order book snapshots and deltas
    OrderBook,
    /// Public trades
    Trades,
    /// Ticker updates
    Ticker,
    /// Candles
    Ohlcv,
    /// Private order updates
    Orders,
    /// Private fills
    MyTrades,
    /// Balance updates
    Balance,
    /// Authentication replies
    Auth,
    /// Subscribe/unsubscribe acknowledgements
    Subscription,
    /// Exchange-specific feed
    Custom(&'static str),
}

/// Which waiters an exchange error frame applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorScope {
    /// Only these message hashes. The connection stays open.
    Hashes(Vec<String>),
    /// Every private-channel hash on the connection; public waiters are untouched.
    Private,
    /// The whole connection. It is closed and every waiter rejected.
    Connection,
}

/// An error frame recognized by the adapter.
#[derive(Debug, Clone)]
pub struct FrameError {
    /// Affected waiters
    pub scope: ErrorScope,
    /// Error delivered to them
    pub error: Error,
}

impl FrameError {
    /// Error for specific message hashes.
    pub fn hashes(hashes: impl IntoIterator<Item = impl Into<String>>, error: Error) -> Self {
        Self {
            scope: ErrorScope::Hashes(hashes.into_iter().map(Into::into).collect()),
            error,
        }
    }

    /// Authentication failure on the private channel set.
    pub fn private(error: Error) -> Self {
        Self {
            scope: ErrorScope::Private,
            error,
        }
    }

    /// Connection-fatal error.
    pub fn connection(error: Error) -> Self {
        Self {
            scope: ErrorScope::Connection,
            error,
        }
    }
}

/// Frame handler: parses `frame`, updates the store and queues resolutions.
pub type FrameHandler = Arc<dyn Fn(&mut DispatchContext<'_>, &Value) -> Result<()> + Send + Sync>;

/// Handlers keyed by stream kind.
#[derive(Clone, Default)]
pub struct HandlerMap {
    handlers: HashMap<StreamKind, FrameHandler>,
}

impl HandlerMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn on<F>(mut self, kind: StreamKind, handler: F) -> Self
    where
        F: Fn(&mut DispatchContext<'_>, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    /// Handler for `kind`.
    pub fn get(&self, kind: StreamKind) -> Option<&FrameHandler> {
        self.handlers.get(&kind)
    }

    /// Stream kinds with a handler.
    pub fn kinds(&self) -> impl Iterator<Item = StreamKind> + '_ {
        self.handlers.keys().copied()
    }
}

impl std::fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerMap")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Exchange-specific behavior plugged into a connection.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync + 'static {
    /// Exchange name, used in logs.
    fn name(&self) -> &str;

    /// Application-level liveness probe. `None` sends a protocol ping frame.
    fn ping_frame(&self) -> Option<Value> {
        None
    }

    /// Returns `true` if `frame` answers a liveness probe.
    fn is_pong(&self, frame: &Value) -> bool {
        let _ = frame;
        false
    }

    /// Recognizes exchange error frames.
    fn classify_error(&self, frame: &Value) -> Option<FrameError> {
        let _ = frame;
        None
    }

    /// Identifies the stream an inbound frame belongs to.
    fn stream_kind(&self, frame: &Value) -> Option<StreamKind>;

    /// Handlers for every stream kind the adapter emits.
    fn handlers(&self) -> &HandlerMap;

    /// Frame cancelling a recorded subscription, if the exchange has one.
    fn unsubscribe_frame(&self, record: &SubscriptionRecord) -> Option<Value> {
        let _ = record;
        None
    }

    /// Runs the credential handshake on `conn`.
    ///
    /// Called at most once per connection, before its first private
    /// subscription is sent. Typically a one-shot [`Connection::subscribe`]
    /// on the exchange's login channel; failures should be
    /// [`Error::Authentication`].
    async fn authenticate(&self, conn: &Connection) -> Result<()> {
        let _ = conn;
        Ok(())
    }
}
