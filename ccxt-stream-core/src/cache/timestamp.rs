//! Time-bucketed cache for candles.

use std::collections::VecDeque;

use super::{BoundedCache, CacheItem};
use crate::types::Timestamp;

/// Cache keyed by bucket timestamp, kept in ascending time order.
///
/// Appending a record whose timestamp already exists replaces that bucket,
/// which is how a still-forming candle is refined. New buckets are inserted in
/// order and the oldest bucket is dropped on overflow. Records without a
/// timestamp are ignored.
#[derive(Debug, Clone)]
pub struct ArrayCacheByTimestamp<T> {
    items: VecDeque<(Timestamp, T)>,
    limit: usize,
}

impl<T: CacheItem> ArrayCacheByTimestamp<T> {
    /// Creates an empty cache holding at most `limit` buckets (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            items: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Record of the given bucket.
    pub fn get(&self, timestamp: Timestamp) -> Option<&T> {
        self.search(timestamp)
            .ok()
            .map(|index| &self.items[index].1)
    }

    /// Newest bucket.
    pub fn last(&self) -> Option<&T> {
        self.items.back().map(|(_, item)| item)
    }

    fn search(&self, timestamp: Timestamp) -> Result<usize, usize> {
        self.items.binary_search_by_key(&timestamp, |(ts, _)| *ts)
    }
}

impl<T: CacheItem> BoundedCache<T> for ArrayCacheByTimestamp<T> {
    fn append(&mut self, item: T) {
        let Some(timestamp) = item.timestamp() else {
            return;
        };

        // Streams almost always refine the newest bucket or open the next one.
        match self.items.back().map(|(ts, _)| *ts) {
            Some(last) if last == timestamp => {
                if let Some((_, existing)) = self.items.back_mut() {
                    *existing = item;
                }
                return;
            }
            Some(last) if last > timestamp => match self.search(timestamp) {
                Ok(index) => {
                    self.items[index].1 = item;
                    return;
                }
                Err(index) => self.items.insert(index, (timestamp, item)),
            },
            _ => self.items.push_back((timestamp, item)),
        }

        if self.items.len() > self.limit {
            self.items.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn iter<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a T>
    where
        T: 'a,
    {
        self.items.iter().map(|(_, item)| item)
    }
}
