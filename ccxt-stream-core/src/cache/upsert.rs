//! Upsert-by-key cache.

use std::collections::{HashMap, VecDeque};

use super::{BoundedCache, UpsertKey};

/// Where a record lands when an existing key is appended again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertPolicy {
    /// The record keeps its original position; eviction order is unchanged.
    #[default]
    KeepPosition,
    /// The record moves to the newest position.
    MoveToNewest,
}

type KeyIndex = HashMap<String, HashMap<String, u64>>;

/// Cache holding at most one record per `(symbol, id)`.
///
/// Records are looked up by id first, then by client id. Slots are addressed
/// by a monotonically increasing absolute position so moves and evictions
/// never shift the index; vacated slots are compacted once they outnumber
/// live records.
#[derive(Debug, Clone)]
pub struct ArrayCacheBySymbolById<T> {
    slots: VecDeque<Option<T>>,
    base: u64,
    live: usize,
    limit: usize,
    policy: UpsertPolicy,
    by_id: KeyIndex,
    by_client_id: KeyIndex,
}

impl<T: UpsertKey> ArrayCacheBySymbolById<T> {
    /// Creates an empty cache holding at most `limit` records (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self::with_policy(limit, UpsertPolicy::default())
    }

    /// Creates an empty cache with an explicit position policy.
    pub fn with_policy(limit: usize, policy: UpsertPolicy) -> Self {
        Self {
            slots: VecDeque::new(),
            base: 0,
            live: 0,
            limit: limit.max(1),
            policy,
            by_id: HashMap::new(),
            by_client_id: HashMap::new(),
        }
    }

    /// Position policy in effect.
    pub fn policy(&self) -> UpsertPolicy {
        self.policy
    }

    /// Looks a record up by id, falling back to client id.
    pub fn get(&self, symbol: &str, key: &str) -> Option<&T> {
        let pos = self.position(symbol, key)?;
        self.slot(pos)
    }

    /// Returns `true` if a record exists for the key.
    pub fn contains(&self, symbol: &str, key: &str) -> bool {
        self.position(symbol, key).is_some()
    }

    /// All records of one symbol, oldest first.
    pub fn symbol_records(&self, symbol: &str) -> Vec<&T> {
        self.iter()
            .filter(|item| item.symbol() == Some(symbol))
            .collect()
    }

    /// Applies `f` to the record with the given key, then repositions it per
    /// policy. Returns `false` if no such record exists.
    pub fn modify(&mut self, symbol: &str, key: &str, f: impl FnOnce(&mut T)) -> bool {
        let Some(pos) = self.position(symbol, key) else {
            return false;
        };
        let Some(record) = self.slot_mut(pos) else {
            return false;
        };
        let old_keys = Keys::of(record);
        f(record);
        self.rekey(pos, &old_keys);
        true
    }

    fn position(&self, symbol: &str, key: &str) -> Option<u64> {
        let lookup = |index: &KeyIndex| index.get(symbol).and_then(|m| m.get(key)).copied();
        lookup(&self.by_id).or_else(|| lookup(&self.by_client_id))
    }

    fn find(&self, item: &T) -> Option<u64> {
        let symbol = item.symbol().unwrap_or_default();
        let lookup = |index: &KeyIndex, key: Option<&str>| {
            key.and_then(|k| index.get(symbol)?.get(k).copied())
        };
        lookup(&self.by_id, item.id()).or_else(|| lookup(&self.by_client_id, item.client_id()))
    }

    fn slot(&self, pos: u64) -> Option<&T> {
        let offset = usize::try_from(pos.checked_sub(self.base)?).ok()?;
        self.slots.get(offset)?.as_ref()
    }

    fn slot_mut(&mut self, pos: u64) -> Option<&mut T> {
        let offset = usize::try_from(pos.checked_sub(self.base)?).ok()?;
        self.slots.get_mut(offset)?.as_mut()
    }

    fn next_position(&self) -> u64 {
        self.base + self.slots.len() as u64
    }

    fn push(&mut self, item: T) -> u64 {
        let pos = self.next_position();
        Keys::of(&item).insert(&mut self.by_id, &mut self.by_client_id, pos);
        self.slots.push_back(Some(item));
        pos
    }

    /// Updates the index after the record at `pos` changed, moving it if the
    /// policy asks for it.
    fn rekey(&mut self, pos: u64, old_keys: &Keys) {
        old_keys.remove(&mut self.by_id, &mut self.by_client_id, pos);
        let moved = match self.policy {
            UpsertPolicy::MoveToNewest if pos + 1 != self.next_position() => {
                usize::try_from(pos - self.base)
                    .ok()
                    .and_then(|offset| self.slots.get_mut(offset))
                    .and_then(Option::take)
            }
            _ => None,
        };
        match moved {
            Some(record) => {
                self.push(record);
                self.trim_front();
                self.compact_if_sparse();
            }
            None => {
                if let Some(record) = self.slot(pos) {
                    Keys::of(record).insert(&mut self.by_id, &mut self.by_client_id, pos);
                }
            }
        }
    }

    fn evict_oldest(&mut self) {
        while let Some(slot) = self.slots.pop_front() {
            let pos = self.base;
            self.base += 1;
            if let Some(record) = slot {
                Keys::of(&record).remove(&mut self.by_id, &mut self.by_client_id, pos);
                self.live -= 1;
                break;
            }
        }
        self.trim_front();
    }

    fn trim_front(&mut self) {
        while matches!(self.slots.front(), Some(None)) {
            self.slots.pop_front();
            self.base += 1;
        }
    }

    fn compact_if_sparse(&mut self) {
        if self.slots.len() <= 2 * self.live + 16 {
            return;
        }
        let records: Vec<T> = self.slots.drain(..).flatten().collect();
        self.by_id.clear();
        self.by_client_id.clear();
        for record in records {
            self.push(record);
        }
    }
}

impl<T: UpsertKey> BoundedCache<T> for ArrayCacheBySymbolById<T> {
    fn append(&mut self, item: T) {
        if let Some(pos) = self.find(&item) {
            if let Some(existing) = self.slot_mut(pos) {
                let old_keys = Keys::of(existing);
                existing.merge(item);
                self.rekey(pos, &old_keys);
                return;
            }
        }

        self.push(item);
        self.live += 1;
        if self.live > self.limit {
            self.evict_oldest();
        }
    }

    fn len(&self) -> usize {
        self.live
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn iter<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a T>
    where
        T: 'a,
    {
        self.slots.iter().filter_map(Option::as_ref)
    }
}

/// Owned copy of a record's index keys.
struct Keys {
    symbol: String,
    id: Option<String>,
    client_id: Option<String>,
}

impl Keys {
    fn of<T: UpsertKey>(item: &T) -> Self {
        Self {
            symbol: item.symbol().unwrap_or_default().to_string(),
            id: item.id().map(str::to_string),
            client_id: item.client_id().map(str::to_string),
        }
    }

    fn insert(&self, by_id: &mut KeyIndex, by_client_id: &mut KeyIndex, pos: u64) {
        for (index, key) in [(by_id, &self.id), (by_client_id, &self.client_id)] {
            if let Some(key) = key {
                index
                    .entry(self.symbol.clone())
                    .or_default()
                    .insert(key.clone(), pos);
            }
        }
    }

    /// Removes entries that still point at `pos`.
    fn remove(&self, by_id: &mut KeyIndex, by_client_id: &mut KeyIndex, pos: u64) {
        for (index, key) in [(by_id, &self.id), (by_client_id, &self.client_id)] {
            let Some(key) = key else { continue };
            if let Some(per_symbol) = index.get_mut(&self.symbol) {
                if per_symbol.get(key) == Some(&pos) {
                    per_symbol.remove(key);
                }
                if per_symbol.is_empty() {
                    index.remove(&self.symbol);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Order, OrderSide, OrderStatus};
    use rust_decimal_macros::dec;

    fn order(id: &str, symbol: &str) -> Order {
        Order::new(id, symbol, OrderSide::Buy, Some(dec!(1)), Some(dec!(100)))
    }

    fn ids(cache: &ArrayCacheBySymbolById<Order>) -> Vec<String> {
        cache.iter().map(|o| o.id.clone()).collect()
    }

    #[test]
    fn test_upsert_replaces_without_growing() {
        let mut cache = ArrayCacheBySymbolById::new(10);
        cache.append(order("1", "BTC/USDT"));
        cache.append(order("2", "BTC/USDT"));
        cache.append(order("1", "BTC/USDT").with_status(OrderStatus::Canceled));

        assert_eq!(cache.len(), 2);
        assert_eq!(ids(&cache), vec!["1", "2"]);
        assert_eq!(cache.get("BTC/USDT", "1").map(|o| o.status), Some(OrderStatus::Canceled));
    }

    #[test]
    fn test_same_id_different_symbol_is_distinct() {
        let mut cache = ArrayCacheBySymbolById::new(10);
        cache.append(order("1", "BTC/USDT"));
        cache.append(order("1", "ETH/USDT"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.symbol_records("ETH/USDT").len(), 1);
    }

    #[test]
    fn test_move_to_newest_policy() {
        let mut cache = ArrayCacheBySymbolById::with_policy(3, UpsertPolicy::MoveToNewest);
        cache.append(order("1", "BTC/USDT"));
        cache.append(order("2", "BTC/USDT"));
        cache.append(order("3", "BTC/USDT"));
        cache.append(order("1", "BTC/USDT"));
        assert_eq!(ids(&cache), vec!["2", "3", "1"]);

        cache.append(order("4", "BTC/USDT"));
        assert_eq!(ids(&cache), vec!["3", "1", "4"]);
        assert!(!cache.contains("BTC/USDT", "2"));
    }

    #[test]
    fn test_eviction_clears_evicted_keys_only() {
        let mut cache = ArrayCacheBySymbolById::new(2);
        cache.append(order("1", "BTC/USDT"));
        cache.append(order("1", "ETH/USDT"));
        cache.append(order("2", "BTC/USDT"));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("BTC/USDT", "1"));
        assert!(cache.contains("ETH/USDT", "1"));
        assert!(cache.contains("BTC/USDT", "2"));
    }

    #[test]
    fn test_lookup_by_client_id() {
        let mut cache = ArrayCacheBySymbolById::new(5);
        cache.append(order("1", "BTC/USDT").with_client_order_id("my-1"));
        assert_eq!(cache.get("BTC/USDT", "my-1").map(|o| o.id.as_str()), Some("1"));

        let mut renamed = order("1", "BTC/USDT").with_client_order_id("my-1");
        renamed.status = OrderStatus::Closed;
        cache.append(renamed);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_client_id_record_acked_with_exchange_id() {
        let mut cache = ArrayCacheBySymbolById::new(5);
        cache.append(order("", "BTC/USDT").with_client_order_id("c-9"));

        cache.append(order("77", "BTC/USDT").with_client_order_id("c-9"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("BTC/USDT", "77").map(|o| o.id.as_str()), Some("77"));
        assert_eq!(cache.get("BTC/USDT", "c-9").map(|o| o.id.as_str()), Some("77"));
    }

    #[test]
    fn test_modify_in_place() {
        let mut cache = ArrayCacheBySymbolById::new(5);
        cache.append(order("1", "BTC/USDT"));
        assert!(cache.modify("BTC/USDT", "1", |o| o.status = OrderStatus::Expired));
        assert!(!cache.modify("BTC/USDT", "404", |o| o.status = OrderStatus::Expired));
        assert_eq!(cache.get("BTC/USDT", "1").map(|o| o.status), Some(OrderStatus::Expired));
    }

    #[test]
    fn test_repeated_moves_stay_compact() {
        let mut cache = ArrayCacheBySymbolById::with_policy(4, UpsertPolicy::MoveToNewest);
        for i in 0..4 {
            cache.append(order(&i.to_string(), "BTC/USDT"));
        }
        for round in 0..500 {
            cache.append(order(&(round % 3).to_string(), "BTC/USDT"));
        }
        assert_eq!(cache.len(), 4);
        assert!(cache.slots.len() <= 2 * cache.live + 16);
        assert_eq!(cache.iter().count(), 4);
        for i in 0..4 {
            assert!(cache.contains("BTC/USDT", &i.to_string()));
        }
    }
}
