//! # CCXT Stream
//!
//! Streaming WebSocket transport for cryptocurrency exchange connectors.
//!
//! ## Features
//!
//! - **Connection pool**: one socket per URL, multiplexed subscriptions
//! - **Message hashes**: one-shot and persistent waiters resolved by frame handlers
//! - **Bounded caches**: trades, candles and orders with fixed retention
//! - **Order books**: exact decimal books with sequence and checksum checks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ccxt_stream::prelude::*;
//!
//! fn main() {
//!     init_logging(&LogConfig::development());
//!     let store = StreamStore::new(CacheLimits::default());
//!     assert!(store.orderbook("BTC/USDT", None).is_none());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Re-export core types and traits
pub use ccxt_stream_core::{
    Error, Result, StreamClient,
    cache, client, config, error, logging, orderbook, registry, types, ws,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use ccxt_stream_core::prelude::*;
}
