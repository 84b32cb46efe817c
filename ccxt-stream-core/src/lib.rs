//! Streaming transport core for exchange connectors.
//!
//! One WebSocket per URL carries many logical subscriptions. Each outbound
//! subscribe frame is paired with a *message hash*; inbound frames are routed
//! through the adapter's handlers, which update bounded caches and order
//! books and then resolve the hashes they touched.
//!
//! # Features
//!
//! - **Connection pool**: at most one live socket per URL, lazily replaced
//!   after a fatal error, with subscription replay and backoff
//! - **Future registry**: one-shot and persistent waiters per message hash
//! - **Bounded caches**: FIFO, upsert-by-key and time-bucketed
//! - **Order books**: snapshot plus delta reconstruction with sequence and
//!   checksum verification, exact `Decimal` arithmetic
//!
//! # Example
//!
//! ```rust,no_run
//! use ccxt_stream_core::prelude::*;
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//!
//! struct Ticker {
//!     handlers: HandlerMap,
//! }
//!
//! impl ExchangeAdapter for Ticker {
//!     fn name(&self) -> &str {
//!         "ticker"
//!     }
//!
//!     fn stream_kind(&self, frame: &Value) -> Option<StreamKind> {
//!         frame.get("ticker").map(|_| StreamKind::Ticker)
//!     }
//!
//!     fn handlers(&self) -> &HandlerMap {
//!         &self.handlers
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let handlers = HandlerMap::new().on(StreamKind::Ticker, |ctx, frame| {
//!     ctx.resolve("ticker::BTC/USDT", StreamUpdate::Message(frame.clone()));
//!     Ok(())
//! });
//! let client = StreamClient::new(
//!     Arc::new(Ticker { handlers }),
//!     WsConfig::default(),
//!     CacheLimits::default(),
//! );
//!
//! let update = client
//!     .watch(
//!         "wss://stream.example.com/ws",
//!         "ticker::BTC/USDT",
//!         json!({"op": "subscribe", "channel": "ticker", "symbol": "BTC/USDT"}),
//!         None,
//!     )
//!     .await?;
//! # let _ = update;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// =============================================================================
// Global Clippy Lint Suppressions
// =============================================================================
// - module_name_repetitions: OrderBookStore in orderbook, StreamUpdate in ws
// - missing_errors_doc / missing_panics_doc: too verbose for every Result
// - must_use_candidate: accessors do not need #[must_use]
// - doc_markdown: OHLCV, CRC32 and similar terms
// - similar_names: bid/ask, buy/sell
// - cast_sign_loss / cast_possible_wrap: i64 <-> u64 timestamps
// - return_self_not_must_use: builder methods
// - unreadable_literal: millisecond timestamps
// =============================================================================
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::unreadable_literal)]

// Re-exports of external dependencies
pub use rust_decimal;
pub use serde;
pub use serde_json;

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod orderbook;
pub mod registry;
pub mod types;
pub mod ws;

pub use client::StreamClient;
pub use config::{BackoffConfig, BackoffStrategy, CacheLimits, HeartbeatConfig, ReconnectPolicy, WsConfig};
pub use error::{ContextExt, Error, NetworkError, ParseError, Result, WsErrorKind};
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// ```rust
/// use ccxt_stream_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::{
        ArrayCache, ArrayCacheBySymbolById, ArrayCacheByTimestamp, BoundedCache, CacheItem,
        FillOutcome, OrderCache, UpsertKey, UpsertPolicy,
    };
    pub use crate::client::StreamClient;
    pub use crate::config::{
        BackoffConfig, BackoffStrategy, CacheLimits, HeartbeatConfig, ReconnectPolicy, WsConfig,
    };
    pub use crate::error::{ContextExt, Error, NetworkError, OutOfSyncReason, Result};
    pub use crate::logging::{LogConfig, LogFormat, LogLevel, init_logging, try_init_logging};
    pub use crate::orderbook::{
        ChecksumFormat, ChecksumLayout, DeltaBatch, DeltaOutcome, LevelUpdate, OrderBook,
        OrderBookEntry, OrderBookSnapshot, OrderBookStore, SequencePolicy, Side,
    };
    pub use crate::registry::{FutureRegistry, Waiter, WaiterKind};
    pub use crate::types::{
        Fee, Ohlcv, Order, OrderSide, OrderStatus, OrderType, Symbol, TakerOrMaker, Timestamp,
        Trade,
    };
    pub use crate::ws::{
        Connection, ConnectionEvent, ConnectionPool, ConnectionState, DispatchContext,
        ErrorScope, ExchangeAdapter, FrameError, HandlerMap, StreamKind, StreamStore,
        StreamUpdate, Subscribe,
    };
    pub use rust_decimal::Decimal;
    pub use serde::{Deserialize, Serialize};
    pub use tokio_util::sync::CancellationToken;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
