//! Live order cache with fill accumulation.

use std::collections::VecDeque;

use tracing::warn;

use super::{ArrayCacheBySymbolById, BoundedCache, UpsertPolicy};
use crate::error::{Error, Result};
use crate::types::{Order, Trade};

/// Result of feeding a private fill to the [`OrderCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The fill was accumulated into its order.
    Applied,
    /// The order already holds a fill with this trade id.
    Duplicate,
    /// The order is not known yet; the fill is held until it appears.
    Parked,
}

/// Orders keyed by `(symbol, id)` plus fills that arrived before their order.
///
/// Exchanges do not guarantee that an order-placement event precedes the
/// first execution report. Such fills are parked in a bounded buffer and
/// replayed, in arrival order, when the order is upserted.
#[derive(Debug, Clone)]
pub struct OrderCache {
    orders: ArrayCacheBySymbolById<Order>,
    pending: VecDeque<Trade>,
    pending_limit: usize,
}

impl OrderCache {
    /// Creates a cache for `limit` orders and `pending_limit` parked fills.
    pub fn new(limit: usize, pending_limit: usize) -> Self {
        Self::with_policy(limit, pending_limit, UpsertPolicy::default())
    }

    /// Creates a cache with an explicit position policy.
    pub fn with_policy(limit: usize, pending_limit: usize, policy: UpsertPolicy) -> Self {
        Self {
            orders: ArrayCacheBySymbolById::with_policy(limit, policy),
            pending: VecDeque::new(),
            pending_limit: pending_limit.max(1),
        }
    }

    /// The underlying order cache.
    pub fn orders(&self) -> &ArrayCacheBySymbolById<Order> {
        &self.orders
    }

    /// Number of fills waiting for their order.
    pub fn pending_fills(&self) -> usize {
        self.pending.len()
    }

    /// Inserts or merges an order update, then applies any parked fills for it.
    /// Returns how many parked fills were applied.
    pub fn upsert_order(&mut self, order: Order) -> usize {
        let symbol = order.symbol.clone();
        let keys = [Some(order.id.clone()), order.client_order_id.clone()];
        self.orders.append(order);

        let (matched, rest): (Vec<Trade>, Vec<Trade>) =
            self.pending.drain(..).partition(|trade| {
                trade.symbol == symbol
                    && trade
                        .order
                        .as_ref()
                        .is_some_and(|id| keys.iter().flatten().any(|k| k == id))
            });
        self.pending = rest.into();

        let mut applied = 0;
        for trade in matched {
            if let Some(order_id) = trade.order.as_deref() {
                self.orders.modify(&symbol, order_id, |o| {
                    if o.apply_fill(&trade) {
                        applied += 1;
                    }
                });
            }
        }
        applied
    }

    /// Accumulates a fill into its order, or parks it if the order is unknown.
    pub fn apply_fill(&mut self, trade: Trade) -> Result<FillOutcome> {
        let Some(order_id) = trade.order.clone() else {
            return Err(Error::invalid_request("fill carries no order id"));
        };

        let mut changed = false;
        if self
            .orders
            .modify(&trade.symbol, &order_id, |o| changed = o.apply_fill(&trade))
        {
            return Ok(if changed {
                FillOutcome::Applied
            } else {
                FillOutcome::Duplicate
            });
        }

        if self.pending.len() >= self.pending_limit
            && let Some(dropped) = self.pending.pop_front()
        {
            warn!(
                symbol = %dropped.symbol,
                order = ?dropped.order,
                "Pending fill buffer full, dropping oldest fill"
            );
        }
        self.pending.push_back(trade);
        Ok(FillOutcome::Parked)
    }
}

impl BoundedCache<Order> for OrderCache {
    fn append(&mut self, item: Order) {
        self.upsert_order(item);
    }

    fn len(&self) -> usize {
        self.orders.len()
    }

    fn limit(&self) -> usize {
        self.orders.limit()
    }

    fn iter<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a Order>
    where
        Order: 'a,
    {
        self.orders.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fee, OrderSide, OrderStatus};
    use rust_decimal_macros::dec;

    fn order(id: &str) -> Order {
        Order::new(id, "BTC/USDT", OrderSide::Sell, Some(dec!(2)), Some(dec!(50)))
    }

    fn fill(trade_id: &str, order_id: &str, amount: rust_decimal::Decimal) -> Trade {
        Trade::new("BTC/USDT", OrderSide::Sell, dec!(50), amount, 1)
            .with_id(trade_id)
            .with_order(order_id)
            .with_fee(Fee::new("USDT", dec!(0.01)))
    }

    #[test]
    fn test_fill_after_order_is_applied() {
        let mut cache = OrderCache::new(10, 10);
        cache.upsert_order(order("A"));
        assert_eq!(cache.apply_fill(fill("t1", "A", dec!(0.5))).unwrap(), FillOutcome::Applied);
        assert_eq!(cache.apply_fill(fill("t1", "A", dec!(0.5))).unwrap(), FillOutcome::Duplicate);

        let stored = cache.orders().get("BTC/USDT", "A").unwrap();
        assert_eq!(stored.filled, dec!(0.5));
        assert_eq!(stored.remaining, Some(dec!(1.5)));
    }

    #[test]
    fn test_fill_before_order_is_parked_then_replayed() {
        let mut cache = OrderCache::new(10, 10);
        assert_eq!(cache.apply_fill(fill("t1", "A", dec!(1.5))).unwrap(), FillOutcome::Parked);
        assert_eq!(cache.apply_fill(fill("t2", "A", dec!(0.5))).unwrap(), FillOutcome::Parked);
        assert_eq!(cache.apply_fill(fill("t3", "B", dec!(0.1))).unwrap(), FillOutcome::Parked);
        assert!(cache.is_empty());

        assert_eq!(cache.upsert_order(order("A")), 2);
        assert_eq!(cache.pending_fills(), 1);

        let stored = cache.orders().get("BTC/USDT", "A").unwrap();
        assert_eq!(stored.filled, dec!(2));
        assert_eq!(stored.remaining, Some(dec!(0)));
        assert_eq!(stored.status, OrderStatus::Closed);
        assert_eq!(stored.fee.as_ref().map(|f| f.cost), Some(dec!(0.02)));
    }

    #[test]
    fn test_parked_fill_matches_client_order_id() {
        let mut cache = OrderCache::new(10, 10);
        cache.apply_fill(fill("t1", "c-1", dec!(1))).unwrap();
        assert_eq!(cache.upsert_order(order("A").with_client_order_id("c-1")), 1);
        assert_eq!(cache.pending_fills(), 0);
    }

    #[test]
    fn test_pending_buffer_is_bounded() {
        let mut cache = OrderCache::new(10, 2);
        for i in 0..5 {
            cache.apply_fill(fill(&format!("t{i}"), "X", dec!(0.1))).unwrap();
        }
        assert_eq!(cache.pending_fills(), 2);
    }

    #[test]
    fn test_fill_without_order_id_is_rejected() {
        let mut cache = OrderCache::new(10, 2);
        let trade = Trade::new("BTC/USDT", OrderSide::Buy, dec!(1), dec!(1), 1);
        assert!(cache.apply_fill(trade).is_err());
    }
}
