//! Per-symbol book registry.

use dashmap::DashMap;
use rust_decimal::Decimal;

use super::book::{DeltaBatch, DeltaOutcome, OrderBook, OrderBookSnapshot, SequencePolicy};
use super::checksum::ChecksumFormat;
use super::side::{OrderBookEntry, Side};
use crate::config::DEFAULT_ORDERBOOK_BUFFER;
use crate::error::Result;

/// Books keyed by symbol, created lazily on first use.
///
/// Each book is only written by the receive loop of the connection that
/// carries its stream; the map itself may be read from any task.
#[derive(Debug)]
pub struct OrderBookStore {
    books: DashMap<String, OrderBook>,
    default_policy: SequencePolicy,
    buffer_limit: usize,
}

impl Default for OrderBookStore {
    fn default() -> Self {
        Self::new(SequencePolicy::default(), DEFAULT_ORDERBOOK_BUFFER)
    }
}

impl OrderBookStore {
    /// Creates an empty store; new books use `default_policy`.
    pub fn new(default_policy: SequencePolicy, buffer_limit: usize) -> Self {
        Self {
            books: DashMap::new(),
            default_policy,
            buffer_limit,
        }
    }

    /// Registers a book for a symbol with its own sequencing policy,
    /// replacing any existing book.
    pub fn insert(&self, symbol: impl Into<String>, policy: SequencePolicy) {
        let symbol = symbol.into();
        let book = OrderBook::new(symbol.clone(), policy).with_buffer_limit(self.buffer_limit);
        self.books.insert(symbol, book);
    }

    fn with_book<R>(&self, symbol: &str, f: impl FnOnce(&mut OrderBook) -> R) -> R {
        let mut entry = self.books.entry(symbol.to_string()).or_insert_with(|| {
            OrderBook::new(symbol, self.default_policy).with_buffer_limit(self.buffer_limit)
        });
        f(entry.value_mut())
    }

    /// Replaces the book for `symbol` with a snapshot.
    pub fn apply_snapshot(
        &self,
        symbol: &str,
        bids: Vec<OrderBookEntry>,
        asks: Vec<OrderBookEntry>,
        sequence: Option<u64>,
    ) -> Result<usize> {
        self.with_book(symbol, |book| book.apply_snapshot(bids, asks, sequence))
    }

    /// Applies a single-level delta to `symbol`.
    pub fn apply_delta(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        sequence: Option<u64>,
    ) -> Result<DeltaOutcome> {
        self.with_book(symbol, |book| book.apply_delta(side, price, size, sequence))
    }

    /// Applies a batch of level changes to `symbol`.
    pub fn apply_batch(&self, symbol: &str, batch: DeltaBatch) -> Result<DeltaOutcome> {
        self.with_book(symbol, |book| book.apply_batch(batch))
    }

    /// Verifies an exchange checksum against `symbol`'s book.
    pub fn verify_checksum(&self, symbol: &str, expected: i64, format: &ChecksumFormat) -> Result<()> {
        self.with_book(symbol, |book| book.verify_checksum(expected, format))
    }

    /// Materialized view of `symbol`, or `None` if no book exists.
    pub fn materialize(&self, symbol: &str, depth: Option<usize>) -> Option<OrderBookSnapshot> {
        self.books.get(symbol).map(|book| book.materialize(depth))
    }

    /// Runs `f` against the book of `symbol`, if present.
    pub fn inspect<R>(&self, symbol: &str, f: impl FnOnce(&OrderBook) -> R) -> Option<R> {
        self.books.get(symbol).map(|book| f(book.value()))
    }

    /// Marks the book of `symbol` out of sync until its next snapshot.
    /// Returns `false` if no book exists.
    pub fn invalidate(&self, symbol: &str) -> bool {
        self.books
            .get_mut(symbol)
            .map(|mut book| book.invalidate())
            .is_some()
    }

    /// Drops the book of `symbol`.
    pub fn remove(&self, symbol: &str) -> Option<OrderBook> {
        self.books.remove(symbol).map(|(_, book)| book)
    }

    /// Symbols with a book.
    pub fn symbols(&self) -> Vec<String> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of books.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Returns `true` if no book exists.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
