//! Caches and books fed by adapter handlers.

use dashmap::DashMap;
use std::sync::Mutex;

use super::lock;
use crate::cache::{
    ArrayCache, ArrayCacheBySymbolById, ArrayCacheByTimestamp, BoundedCache, FillOutcome,
    OrderCache,
};
use crate::config::CacheLimits;
use crate::error::Result;
use crate::orderbook::{OrderBookSnapshot, OrderBookStore, SequencePolicy};
use crate::types::{Ohlcv, Order, Trade};

/// In-memory replica of every stream an adapter follows.
///
/// Trades and candles are cached per symbol (and timeframe); orders and
/// private fills share one cache across symbols, as exchanges report them on
/// a single private channel.
#[derive(Debug)]
pub struct StreamStore {
    limits: CacheLimits,
    books: OrderBookStore,
    trades: DashMap<String, ArrayCache<Trade>>,
    ohlcv: DashMap<(String, String), ArrayCacheByTimestamp<Ohlcv>>,
    orders: Mutex<OrderCache>,
    my_trades: Mutex<ArrayCacheBySymbolById<Trade>>,
}

impl Default for StreamStore {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}

impl StreamStore {
    /// Creates an empty store; books use [`SequencePolicy::Unsequenced`]
    /// unless registered otherwise.
    pub fn new(limits: CacheLimits) -> Self {
        Self::with_sequence_policy(limits, SequencePolicy::default())
    }

    /// Creates an empty store whose books default to `policy`.
    pub fn with_sequence_policy(limits: CacheLimits, policy: SequencePolicy) -> Self {
        Self {
            limits,
            books: OrderBookStore::new(policy, limits.orderbook_buffer),
            trades: DashMap::new(),
            ohlcv: DashMap::new(),
            orders: Mutex::new(OrderCache::new(limits.orders, limits.pending_fills)),
            my_trades: Mutex::new(ArrayCacheBySymbolById::new(limits.my_trades)),
        }
    }

    /// Configured cache bounds.
    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Per-symbol order books.
    pub fn books(&self) -> &OrderBookStore {
        &self.books
    }

    /// Appends public trades for `symbol`.
    pub fn append_trades(&self, symbol: &str, trades: impl IntoIterator<Item = Trade>) {
        let mut cache = self
            .trades
            .entry(symbol.to_string())
            .or_insert_with(|| ArrayCache::new(self.limits.trades));
        for trade in trades {
            cache.append(trade);
        }
    }

    /// The `limit` most recent trades of `symbol`, oldest first.
    pub fn trades(&self, symbol: &str, limit: Option<usize>) -> Vec<Trade> {
        self.trades
            .get(symbol)
            .map(|cache| cache.get_limit(None, limit))
            .unwrap_or_default()
    }

    /// Inserts or updates a candle for `(symbol, timeframe)`.
    pub fn append_ohlcv(&self, symbol: &str, timeframe: &str, candle: Ohlcv) {
        self.ohlcv
            .entry((symbol.to_string(), timeframe.to_string()))
            .or_insert_with(|| ArrayCacheByTimestamp::new(self.limits.ohlcv))
            .append(candle);
    }

    /// The `limit` most recent candles of `(symbol, timeframe)`, oldest first.
    pub fn ohlcv(&self, symbol: &str, timeframe: &str, limit: Option<usize>) -> Vec<Ohlcv> {
        self.ohlcv
            .get(&(symbol.to_string(), timeframe.to_string()))
            .map(|cache| cache.get_limit(None, limit))
            .unwrap_or_default()
    }

    /// Inserts or merges an order update. Returns how many parked fills it absorbed.
    pub fn upsert_order(&self, order: Order) -> usize {
        lock(&self.orders).upsert_order(order)
    }

    /// Records a private fill and accumulates it into its order.
    ///
    /// The fill is kept in the private-trade cache even when it carries no
    /// order id and the order cache rejects it.
    pub fn apply_fill(&self, trade: Trade) -> Result<FillOutcome> {
        lock(&self.my_trades).append(trade.clone());
        lock(&self.orders).apply_fill(trade)
    }

    /// The `limit` most recent orders, optionally for one symbol.
    pub fn orders(&self, symbol: Option<&str>, limit: Option<usize>) -> Vec<Order> {
        lock(&self.orders).get_limit(symbol, limit)
    }

    /// A single order by exchange or client id.
    pub fn order(&self, symbol: &str, id: &str) -> Option<Order> {
        lock(&self.orders).orders().get(symbol, id).cloned()
    }

    /// Number of fills waiting for their order.
    pub fn pending_fills(&self) -> usize {
        lock(&self.orders).pending_fills()
    }

    /// The `limit` most recent private fills, optionally for one symbol.
    pub fn my_trades(&self, symbol: Option<&str>, limit: Option<usize>) -> Vec<Trade> {
        lock(&self.my_trades).get_limit(symbol, limit)
    }

    /// Materialized book of `symbol`, truncated to `depth` levels per side.
    pub fn orderbook(&self, symbol: &str, depth: Option<usize>) -> Option<OrderBookSnapshot> {
        self.books.materialize(symbol, depth)
    }
}
