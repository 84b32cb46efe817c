//! Order book reconstruction from snapshots and deltas.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

use super::checksum::ChecksumFormat;
use super::side::{BookSide, OrderBookEntry, Side};
use crate::config::DEFAULT_ORDERBOOK_BUFFER;
use crate::error::{Error, OutOfSyncReason, Result};
use crate::types::{Symbol, Timestamp};

/// How a stream numbers its deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePolicy {
    /// No sequence numbers; deltas apply in arrival order.
    #[default]
    Unsequenced,
    /// Each delta must carry exactly the previous sequence plus one.
    Strict,
    /// Sequences only need to increase; gaps are allowed.
    Monotonic,
}

/// One price-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpdate {
    /// Side the level belongs to
    pub side: Side,
    /// Price level
    pub price: Decimal,
    /// New total amount; zero removes the level
    pub size: Decimal,
}

impl LevelUpdate {
    /// Creates a level update.
    pub fn new(side: Side, price: Decimal, size: Decimal) -> Self {
        Self { side, price, size }
    }
}

/// Level changes sharing one sequence, applied atomically.
///
/// Range-numbered streams set `first_sequence` to the first update id in the
/// event and `sequence` to the last; single-numbered streams leave
/// `first_sequence` unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeltaBatch {
    /// First sequence covered by this batch
    pub first_sequence: Option<u64>,
    /// Last sequence covered by this batch
    pub sequence: Option<u64>,
    /// Exchange timestamp
    pub timestamp: Option<Timestamp>,
    /// Level changes in exchange order
    pub updates: Vec<LevelUpdate>,
}

impl DeltaBatch {
    /// Creates a batch with a single sequence number.
    pub fn new(sequence: Option<u64>, updates: Vec<LevelUpdate>) -> Self {
        Self {
            first_sequence: None,
            sequence,
            timestamp: None,
            updates,
        }
    }

    /// Sets the first sequence of a range-numbered batch.
    pub fn with_first_sequence(mut self, first: u64) -> Self {
        self.first_sequence = Some(first);
        self
    }

    /// Sets the exchange timestamp.
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// What happened to a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Levels were updated.
    Applied,
    /// The delta is older than the book and was ignored.
    Stale,
    /// No snapshot yet; the delta was buffered for replay.
    Buffered,
}

/// Read-only view of a book, bids descending and asks ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Unified symbol
    pub symbol: Symbol,
    /// Bid levels, best first
    pub bids: Vec<OrderBookEntry>,
    /// Ask levels, best first
    pub asks: Vec<OrderBookEntry>,
    /// Sequence of the last applied update
    pub nonce: Option<u64>,
    /// Exchange timestamp of the last applied update
    pub timestamp: Option<Timestamp>,
}

/// Local replica of one symbol's book.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: Symbol,
    bids: BookSide,
    asks: BookSide,
    nonce: Option<u64>,
    timestamp: Option<Timestamp>,
    policy: SequencePolicy,
    has_snapshot: bool,
    needs_resync: bool,
    buffered: VecDeque<DeltaBatch>,
    buffer_limit: usize,
}

impl OrderBook {
    /// Creates an empty book awaiting its first snapshot.
    pub fn new(symbol: impl Into<Symbol>, policy: SequencePolicy) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            nonce: None,
            timestamp: None,
            policy,
            has_snapshot: false,
            needs_resync: false,
            buffered: VecDeque::new(),
            buffer_limit: DEFAULT_ORDERBOOK_BUFFER,
        }
    }

    /// Sets how many deltas are buffered before the first snapshot.
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Symbol of this book.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Sequence of the last applied update.
    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    /// Exchange timestamp of the last applied update.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Sequencing policy.
    pub fn policy(&self) -> SequencePolicy {
        self.policy
    }

    /// Bid side.
    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    /// Ask side.
    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// `true` once a snapshot was applied and no integrity failure happened since.
    pub fn is_synced(&self) -> bool {
        self.has_snapshot && !self.needs_resync
    }

    /// `true` after a sequence gap or checksum mismatch, until the next snapshot.
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Number of deltas waiting for a snapshot.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Replaces both sides and the sequence, then replays buffered deltas
    /// newer than the snapshot. Returns the number of deltas replayed.
    ///
    /// Unsequenced books drop their buffer instead: without sequence numbers
    /// nothing orders a buffered delta against the snapshot.
    ///
    /// A gap found while replaying leaves the book out of sync and is returned
    /// as an error.
    pub fn apply_snapshot<B, A>(&mut self, bids: B, asks: A, sequence: Option<u64>) -> Result<usize>
    where
        B: IntoIterator<Item = OrderBookEntry>,
        A: IntoIterator<Item = OrderBookEntry>,
    {
        self.bids.replace(bids);
        self.asks.replace(asks);
        self.nonce = sequence;
        self.has_snapshot = true;
        self.needs_resync = false;

        if self.policy == SequencePolicy::Unsequenced {
            if !self.buffered.is_empty() {
                debug!(
                    symbol = %self.symbol,
                    dropped = self.buffered.len(),
                    "Dropped unsequenced buffered deltas"
                );
                self.buffered.clear();
            }
            return Ok(0);
        }

        let mut replayed = 0;
        while let Some(batch) = self.buffered.pop_front() {
            if self.apply_batch_inner(&batch)? == DeltaOutcome::Applied {
                replayed += 1;
            }
        }
        if replayed > 0 {
            debug!(symbol = %self.symbol, replayed, "Replayed buffered deltas");
        }
        Ok(replayed)
    }

    /// Sets the exchange timestamp of the current state.
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = Some(timestamp);
    }

    /// Applies a single-level delta.
    pub fn apply_delta(
        &mut self,
        side: Side,
        price: Decimal,
        size: Decimal,
        sequence: Option<u64>,
    ) -> Result<DeltaOutcome> {
        self.apply_batch(DeltaBatch::new(
            sequence,
            vec![LevelUpdate::new(side, price, size)],
        ))
    }

    /// Applies a batch of level changes with one sequence check.
    pub fn apply_batch(&mut self, batch: DeltaBatch) -> Result<DeltaOutcome> {
        if self.needs_resync {
            return Err(Error::out_of_sync(
                self.symbol.clone(),
                OutOfSyncReason::NotSynchronized,
            ));
        }
        if !self.has_snapshot {
            if self.buffered.len() >= self.buffer_limit {
                self.buffered.pop_front();
            }
            self.buffered.push_back(batch);
            return Ok(DeltaOutcome::Buffered);
        }
        self.apply_batch_inner(&batch)
    }

    fn apply_batch_inner(&mut self, batch: &DeltaBatch) -> Result<DeltaOutcome> {
        if let Some(outcome) = self.check_sequence(batch)? {
            return Ok(outcome);
        }

        for update in &batch.updates {
            match update.side {
                Side::Bid => self.bids.set(update.price, update.size),
                Side::Ask => self.asks.set(update.price, update.size),
            }
        }
        if self.policy != SequencePolicy::Unsequenced && batch.sequence.is_some() {
            self.nonce = batch.sequence;
        }
        if batch.timestamp.is_some() {
            self.timestamp = batch.timestamp;
        }
        Ok(DeltaOutcome::Applied)
    }

    /// Returns `Some(Stale)` for deltas to skip, an error for gaps, and `None`
    /// when the delta should be applied.
    ///
    /// A strict book that knows its sequence refuses deltas without one.
    fn check_sequence(&mut self, batch: &DeltaBatch) -> Result<Option<DeltaOutcome>> {
        if self.policy == SequencePolicy::Unsequenced {
            return Ok(None);
        }
        let Some(nonce) = self.nonce else {
            return Ok(None);
        };
        let Some(last) = batch.sequence else {
            if self.policy == SequencePolicy::Strict {
                return Err(self.mark_out_of_sync(OutOfSyncReason::MissingSequence));
            }
            return Ok(None);
        };
        if last <= nonce {
            return Ok(Some(DeltaOutcome::Stale));
        }
        if self.policy == SequencePolicy::Strict
            && let Some(expected) = nonce.checked_add(1)
        {
            let first = batch.first_sequence.unwrap_or(last);
            if first > expected {
                return Err(self.mark_out_of_sync(OutOfSyncReason::SequenceGap {
                    expected,
                    received: first,
                }));
            }
        }
        Ok(None)
    }

    /// Compares an exchange-supplied checksum with the local top levels.
    /// A mismatch marks the book out of sync.
    pub fn verify_checksum(&mut self, expected: i64, format: &ChecksumFormat) -> Result<()> {
        let computed = format.compute(&self.bids, &self.asks);
        if computed == expected {
            Ok(())
        } else {
            Err(self.mark_out_of_sync(OutOfSyncReason::ChecksumMismatch { expected, computed }))
        }
    }

    /// Marks the book out of sync; further deltas are rejected until the next
    /// snapshot. Buffered deltas are discarded.
    pub fn invalidate(&mut self) {
        self.needs_resync = true;
        self.buffered.clear();
    }

    fn mark_out_of_sync(&mut self, reason: OutOfSyncReason) -> Error {
        warn!(symbol = %self.symbol, %reason, "Order book out of sync");
        self.needs_resync = true;
        Error::out_of_sync(self.symbol.clone(), reason)
    }

    /// Materializes the book, truncated to `depth` levels per side.
    pub fn materialize(&self, depth: Option<usize>) -> OrderBookSnapshot {
        OrderBookSnapshot {
            symbol: self.symbol.clone(),
            bids: self.bids.top(depth),
            asks: self.asks.top(depth),
            nonce: self.nonce,
            timestamp: self.timestamp,
        }
    }

    /// Highest bid.
    pub fn best_bid(&self) -> Option<OrderBookEntry> {
        self.bids.best()
    }

    /// Lowest ask.
    pub fn best_ask(&self) -> Option<OrderBookEntry> {
        self.asks.best()
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    /// Midpoint of best bid and best ask.
    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_ask()?.price + self.best_bid()?.price) / Decimal::TWO)
    }
}
