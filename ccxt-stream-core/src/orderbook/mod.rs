//! Order book reconstruction.
//!
//! A book is rebuilt from a snapshot followed by deltas. Prices and sizes are
//! `Decimal`, so the zero-size removal check and level lookup are exact.
//! Integrity failures (sequence gap, checksum mismatch) surface as
//! [`Error::OutOfSync`](crate::error::Error::OutOfSync) and leave the book
//! refusing deltas until the adapter applies a fresh snapshot.
//!
//! ```rust
//! use ccxt_stream_core::orderbook::{OrderBook, OrderBookEntry, SequencePolicy, Side};
//! use rust_decimal::Decimal;
//!
//! let mut book = OrderBook::new("BTC/USDT", SequencePolicy::Strict);
//! book.apply_snapshot(
//!     vec![OrderBookEntry::new(Decimal::from(100), Decimal::ONE)],
//!     vec![OrderBookEntry::new(Decimal::from(101), Decimal::ONE)],
//!     Some(5),
//! )?;
//! book.apply_delta(Side::Bid, Decimal::from(100), Decimal::ZERO, Some(6))?;
//! assert!(book.materialize(None).bids.is_empty());
//! # Ok::<(), ccxt_stream_core::error::Error>(())
//! ```

mod book;
mod checksum;
mod side;
mod store;

pub use book::{DeltaBatch, DeltaOutcome, LevelUpdate, OrderBook, OrderBookSnapshot, SequencePolicy};
pub use checksum::{ChecksumFormat, ChecksumLayout};
pub use side::{BookSide, OrderBookEntry, Side};
pub use store::OrderBookStore;
