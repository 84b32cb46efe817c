//! Exchange-facing facade over the pool, the registry and the store.
//!
//! An adapter builds a subscribe frame and a message hash for each unified
//! `watch*` call and hands them to [`StreamClient::watch`]. Its frame
//! handlers update the [`StreamStore`] and resolve the hash; the suspended
//! call then returns the fresh [`StreamUpdate`].

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::{CacheLimits, WsConfig};
use crate::error::{Error, Result};
use crate::orderbook::OrderBookSnapshot;
use crate::registry::Waiter;
use crate::types::{Ohlcv, Order, Trade};
use crate::ws::{
    ConnectionEventCallback, ConnectionPool, ExchangeAdapter, StreamStore, StreamUpdate, Subscribe,
};

/// Streaming client for one exchange.
#[derive(Debug)]
pub struct StreamClient {
    pool: ConnectionPool,
    store: Arc<StreamStore>,
}

impl StreamClient {
    /// Creates a client with a fresh store bounded by `limits`.
    pub fn new(adapter: Arc<dyn ExchangeAdapter>, config: WsConfig, limits: CacheLimits) -> Self {
        Self::with_store(adapter, config, Arc::new(StreamStore::new(limits)))
    }

    /// Creates a client writing into an existing store.
    pub fn with_store(
        adapter: Arc<dyn ExchangeAdapter>,
        config: WsConfig,
        store: Arc<StreamStore>,
    ) -> Self {
        Self {
            pool: ConnectionPool::new(config, adapter, Arc::clone(&store)),
            store,
        }
    }

    /// Sets the lifecycle callback for every connection.
    pub fn with_event_callback(self, callback: ConnectionEventCallback) -> Self {
        Self {
            pool: self.pool.with_event_callback(callback),
            store: self.store,
        }
    }

    /// The connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// The store handlers write to.
    pub fn store(&self) -> &StreamStore {
        &self.store
    }

    /// Subscribes on the connection for `url` and returns the raw waiter.
    pub async fn subscribe(&self, url: &str, request: Subscribe) -> Result<Waiter<StreamUpdate>> {
        let conn = self.pool.get(url)?;
        conn.subscribe(request).await
    }

    fn persistent(message_hash: &str, request: Value, subscription_key: Option<&str>) -> Subscribe {
        let subscribe = Subscribe::persistent(message_hash, request);
        match subscription_key {
            Some(key) => subscribe.with_subscription_key(key),
            None => subscribe,
        }
    }

    /// Subscribes to a stream and waits for its next update.
    ///
    /// Repeated calls with the same hash reuse the subscription; the frame is
    /// only sent the first time.
    #[instrument(name = "stream_watch", skip(self, request))]
    pub async fn watch(
        &self,
        url: &str,
        message_hash: &str,
        request: Value,
        subscription_key: Option<&str>,
    ) -> Result<StreamUpdate> {
        let request = Self::persistent(message_hash, request, subscription_key);
        self.subscribe(url, request).await?.recv().await
    }

    /// Like [`StreamClient::watch`] for a channel that needs authentication.
    #[instrument(name = "stream_watch_private", skip(self, request))]
    pub async fn watch_private(
        &self,
        url: &str,
        message_hash: &str,
        request: Value,
        subscription_key: Option<&str>,
    ) -> Result<StreamUpdate> {
        let request = Self::persistent(message_hash, request, subscription_key).private();
        self.subscribe(url, request).await?.recv().await
    }

    /// Sends a request frame and waits for its single answer.
    #[instrument(name = "stream_request", skip(self, frame))]
    pub async fn request(&self, url: &str, message_hash: &str, frame: Value) -> Result<StreamUpdate> {
        self.subscribe(url, Subscribe::one_shot(message_hash, frame))
            .await?
            .recv()
            .await
    }

    /// Subscribes to a stream and returns every subsequent update as a
    /// stream. It ends when the connection closes or the hash is unwatched.
    pub async fn subscribe_stream(
        &self,
        url: &str,
        message_hash: &str,
        request: Value,
        subscription_key: Option<&str>,
    ) -> Result<BoxStream<'static, Result<StreamUpdate>>> {
        let request = Self::persistent(message_hash, request, subscription_key);
        Ok(self.subscribe(url, request).await?.into_stream().boxed())
    }

    /// Stops following `message_hash` on `url`.
    pub fn unwatch(&self, url: &str, message_hash: &str) -> Result<bool> {
        match self.pool.connection(url) {
            Some(conn) => conn.unsubscribe(message_hash),
            None => Ok(false),
        }
    }

    /// Resolves `message_hash` on the connection for `url`. Returns the number
    /// of waiters reached.
    pub fn resolve_message_hash(&self, url: &str, message_hash: &str, update: StreamUpdate) -> usize {
        self.pool
            .connection(url)
            .map_or(0, |conn| conn.resolve(message_hash, update))
    }

    /// Rejects `message_hash` on the connection for `url`. Returns the number
    /// of waiters reached.
    pub fn reject_message_hash(&self, url: &str, message_hash: &str, error: Error) -> usize {
        self.pool
            .connection(url)
            .map_or(0, |conn| conn.reject(message_hash, error))
    }

    /// Materialized book of `symbol`.
    pub fn orderbook(&self, symbol: &str, depth: Option<usize>) -> Option<OrderBookSnapshot> {
        self.store.orderbook(symbol, depth)
    }

    /// Recent public trades of `symbol`.
    pub fn trades(&self, symbol: &str, limit: Option<usize>) -> Vec<Trade> {
        self.store.trades(symbol, limit)
    }

    /// Recent orders, optionally for one symbol.
    pub fn orders(&self, symbol: Option<&str>, limit: Option<usize>) -> Vec<Order> {
        self.store.orders(symbol, limit)
    }

    /// Recent private fills, optionally for one symbol.
    pub fn my_trades(&self, symbol: Option<&str>, limit: Option<usize>) -> Vec<Trade> {
        self.store.my_trades(symbol, limit)
    }

    /// Recent candles of `(symbol, timeframe)`.
    pub fn ohlcv(&self, symbol: &str, timeframe: &str, limit: Option<usize>) -> Vec<Ohlcv> {
        self.store.ohlcv(symbol, timeframe, limit)
    }

    /// Closes the connection for `url`.
    pub async fn close(&self, url: &str) -> bool {
        self.pool.close(url).await
    }

    /// Closes every connection. Cached data stays readable.
    #[instrument(name = "stream_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        info!(connections = self.pool.len(), "Shutting down stream client");
        self.pool.close_all().await;
    }
}
