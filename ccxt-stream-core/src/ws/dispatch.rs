//! Per-frame dispatch state handed to adapter handlers.

use serde_json::Value;

use super::store::StreamStore;
use crate::error::Error;
use crate::orderbook::{OrderBookSnapshot, OrderBookStore};
use crate::types::{Ohlcv, Order, Trade};

/// Value delivered to waiters when a message hash resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// Materialized book after the update
    OrderBook(OrderBookSnapshot),
    /// Recent public trades
    Trades(Vec<Trade>),
    /// Recent orders
    Orders(Vec<Order>),
    /// Recent private fills
    MyTrades(Vec<Trade>),
    /// Recent candles
    Ohlcv(Vec<Ohlcv>),
    /// Any other payload, such as an acknowledgement or ticker
    Message(Value),
}

/// A queued delivery to the waiters of one message hash.
#[derive(Debug)]
pub(crate) enum Delivery {
    Resolve(StreamUpdate),
    Reject(Error),
}

/// Collects what one inbound frame changed.
///
/// Resolutions and rejections are applied by the connection after the handler
/// returns, in the order they were queued. If the handler fails, its queued
/// resolutions are dropped and every hash it declared as affected, but did
/// not reject itself, is rejected with the handler's error.
///
/// Book writes go through [`DispatchContext::books_for`] so the connection
/// knows which books it feeds and can invalidate them when it dies.
#[derive(Debug)]
pub struct DispatchContext<'a> {
    url: &'a str,
    store: &'a StreamStore,
    affected: Vec<String>,
    deliveries: Vec<(String, Delivery)>,
    books: Vec<String>,
}

/// Outcome of a dispatched frame.
#[derive(Debug, Default)]
pub(crate) struct Dispatched {
    pub affected: Vec<String>,
    pub deliveries: Vec<(String, Delivery)>,
    pub books: Vec<String>,
}

impl<'a> DispatchContext<'a> {
    /// Creates a context for one frame received on `url`.
    pub fn new(url: &'a str, store: &'a StreamStore) -> Self {
        Self {
            url,
            store,
            affected: Vec::new(),
            deliveries: Vec::new(),
            books: Vec::new(),
        }
    }

    /// Endpoint the frame arrived on.
    pub fn url(&self) -> &str {
        self.url
    }

    /// Caches and books the handler updates.
    pub fn store(&self) -> &'a StreamStore {
        self.store
    }

    /// Book store for writing to the book of `symbol`, which is then tied to
    /// this connection.
    pub fn books_for(&mut self, symbol: &str) -> &'a OrderBookStore {
        if !self.books.iter().any(|s| s == symbol) {
            self.books.push(symbol.to_string());
        }
        self.store.books()
    }

    /// Declares that the frame concerns `message_hash`, before any fallible work.
    pub fn affects(&mut self, message_hash: impl Into<String>) {
        let hash = message_hash.into();
        if !self.affected.contains(&hash) {
            self.affected.push(hash);
        }
    }

    /// Queues a resolution of `message_hash`.
    pub fn resolve(&mut self, message_hash: impl Into<String>, update: StreamUpdate) {
        let hash = message_hash.into();
        self.affects(hash.clone());
        self.deliveries.push((hash, Delivery::Resolve(update)));
    }

    /// Queues a rejection of `message_hash`.
    pub fn reject(&mut self, message_hash: impl Into<String>, error: Error) {
        let hash = message_hash.into();
        self.affects(hash.clone());
        self.deliveries.push((hash, Delivery::Reject(error)));
    }

    pub(crate) fn finish(self) -> Dispatched {
        Dispatched {
            affected: self.affected,
            deliveries: self.deliveries,
            books: self.books,
        }
    }
}
