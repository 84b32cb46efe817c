//! Bounded caches for streamed records.
//!
//! | cache | key | on existing key | on overflow |
//! |-------|-----|-----------------|-------------|
//! | [`ArrayCache`] | none | n/a | drop oldest |
//! | [`ArrayCacheBySymbolById`] | (symbol, id or client id) | replace in place or move to newest | drop oldest key |
//! | [`ArrayCacheByTimestamp`] | bucket timestamp | replace bucket | drop oldest bucket |
//!
//! All appends are amortized O(1) for in-order data. Reads never mutate.

mod fifo;
mod orders;
mod timestamp;
mod upsert;

pub use fifo::ArrayCache;
pub use orders::{FillOutcome, OrderCache};
pub use timestamp::ArrayCacheByTimestamp;
pub use upsert::{ArrayCacheBySymbolById, UpsertPolicy};

use crate::types::{Ohlcv, Order, Timestamp, Trade};

/// A record that can be filtered by symbol and time.
pub trait CacheItem {
    /// Symbol the record belongs to, if it carries one.
    fn symbol(&self) -> Option<&str> {
        None
    }

    /// Record timestamp in milliseconds.
    fn timestamp(&self) -> Option<Timestamp>;
}

/// A record the upsert cache can key by `(symbol, id)` or `(symbol, client id)`.
pub trait UpsertKey: CacheItem {
    /// Exchange-assigned identifier.
    fn id(&self) -> Option<&str>;

    /// Client-assigned identifier.
    fn client_id(&self) -> Option<&str> {
        None
    }

    /// Folds a newer record with the same key into this one.
    fn merge(&mut self, newer: Self)
    where
        Self: Sized,
    {
        *self = newer;
    }
}

/// Operations shared by every bounded cache.
pub trait BoundedCache<T> {
    /// Inserts or updates a record, evicting on overflow.
    fn append(&mut self, item: T);

    /// Number of records held.
    fn len(&self) -> usize;

    /// Maximum number of records held.
    fn limit(&self) -> usize;

    /// Records from oldest to newest.
    fn iter<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a T>
    where
        T: 'a;

    /// Returns `true` if the cache holds nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records from oldest to newest, cloned.
    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }

    /// The `limit` most recent records matching `symbol`, oldest first.
    fn get_limit(&self, symbol: Option<&str>, limit: Option<usize>) -> Vec<T>
    where
        T: CacheItem + Clone,
    {
        newest(
            self.iter()
                .rev()
                .filter(|item| symbol.is_none_or(|s| item.symbol() == Some(s))),
            limit,
        )
    }

    /// Records with timestamp at or after `since`, capped to the newest `limit`.
    fn filter_since_limit(
        &self,
        symbol: Option<&str>,
        since: Option<Timestamp>,
        limit: Option<usize>,
    ) -> Vec<T>
    where
        T: CacheItem + Clone,
    {
        newest(
            self.iter().rev().filter(|item| {
                symbol.is_none_or(|s| item.symbol() == Some(s))
                    && since.is_none_or(|since| item.timestamp().is_some_and(|ts| ts >= since))
            }),
            limit,
        )
    }
}

fn newest<'a, T, I>(newest_first: I, limit: Option<usize>) -> Vec<T>
where
    T: Clone + 'a,
    I: Iterator<Item = &'a T>,
{
    let mut out: Vec<T> = newest_first
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();
    out.reverse();
    out
}

impl CacheItem for Trade {
    fn symbol(&self) -> Option<&str> {
        Some(&self.symbol)
    }

    fn timestamp(&self) -> Option<Timestamp> {
        Some(self.timestamp)
    }
}

impl UpsertKey for Trade {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl CacheItem for Order {
    fn symbol(&self) -> Option<&str> {
        Some(&self.symbol)
    }

    fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }
}

impl UpsertKey for Order {
    fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    fn client_id(&self) -> Option<&str> {
        self.client_order_id.as_deref()
    }

    fn merge(&mut self, newer: Self) {
        self.merge_update(newer);
    }
}

impl CacheItem for Ohlcv {
    fn timestamp(&self) -> Option<Timestamp> {
        Some(self.timestamp)
    }
}
