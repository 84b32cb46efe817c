//! One side of a price-level book.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side, best price is the highest.
    Bid,
    /// Sell side, best price is the lowest.
    Ask,
}

/// Price level as `(price, amount)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    /// Price level
    pub price: Decimal,
    /// Total amount resting at this price
    pub amount: Decimal,
}

impl OrderBookEntry {
    /// Creates a level.
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self { price, amount }
    }
}

impl From<(Decimal, Decimal)> for OrderBookEntry {
    fn from((price, amount): (Decimal, Decimal)) -> Self {
        Self::new(price, amount)
    }
}

/// Price-to-amount map for one side.
///
/// `Decimal` compares by value, so `100`, `100.0` and `100.00` address the same
/// level and a zero amount of any scale removes it.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl BookSide {
    /// Creates an empty side.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Which side this is.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Sets the amount at `price`; a zero amount removes the level and removing
    /// an absent level is a no-op.
    pub fn set(&mut self, price: Decimal, amount: Decimal) {
        if amount.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, amount);
        }
    }

    /// Replaces every level. Zero amounts in the input are skipped.
    pub fn replace<I>(&mut self, levels: I)
    where
        I: IntoIterator<Item = OrderBookEntry>,
    {
        self.levels.clear();
        for level in levels {
            self.set(level.price, level.amount);
        }
    }

    /// Amount at `price`.
    pub fn get(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns `true` if the side has no levels.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels from best to worst: descending for bids, ascending for asks.
    pub fn iter_best(&self) -> Box<dyn Iterator<Item = OrderBookEntry> + '_> {
        let levels = self.levels.iter().map(|(p, a)| OrderBookEntry::new(*p, *a));
        match self.side {
            Side::Bid => Box::new(levels.rev()),
            Side::Ask => Box::new(levels),
        }
    }

    /// Best level.
    pub fn best(&self) -> Option<OrderBookEntry> {
        self.iter_best().next()
    }

    /// Best `depth` levels, or all when `depth` is `None`.
    pub fn top(&self, depth: Option<usize>) -> Vec<OrderBookEntry> {
        self.iter_best().take(depth.unwrap_or(usize::MAX)).collect()
    }

    /// Sum of amounts on this side.
    pub fn volume(&self) -> Decimal {
        self.levels.values().copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zero_removes_level_regardless_of_scale() {
        let mut bids = BookSide::new(Side::Bid);
        bids.set(dec!(100.0), dec!(1));
        bids.set(dec!(100), dec!(0.000));
        assert!(bids.is_empty());
    }

    #[test]
    fn test_remove_missing_level_is_noop() {
        let mut asks = BookSide::new(Side::Ask);
        asks.set(dec!(101), dec!(1));
        asks.set(dec!(105), dec!(0));
        assert_eq!(asks.len(), 1);
        assert_eq!(asks.get(dec!(101)), Some(dec!(1)));
    }

    #[test]
    fn test_iteration_order_per_side() {
        let mut bids = BookSide::new(Side::Bid);
        let mut asks = BookSide::new(Side::Ask);
        for p in [dec!(99), dec!(101), dec!(100)] {
            bids.set(p, dec!(1));
            asks.set(p, dec!(1));
        }
        let bid_prices: Vec<_> = bids.top(None).iter().map(|l| l.price).collect();
        let ask_prices: Vec<_> = asks.top(Some(2)).iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![dec!(101), dec!(100), dec!(99)]);
        assert_eq!(ask_prices, vec![dec!(99), dec!(100)]);
        assert_eq!(bids.volume(), dec!(3));
    }
}
