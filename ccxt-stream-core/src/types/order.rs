//! Order type definitions and incremental fill accumulation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Fee, Symbol, Timestamp, Trade};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Market order
    Market,
    /// Limit order
    Limit,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order is open and active
    Open,
    /// Order is fully filled
    Closed,
    /// Order was cancelled
    Canceled,
    /// Order expired
    Expired,
    /// Order was rejected
    Rejected,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Live order as tracked from a private stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange order id
    pub id: String,

    /// Client order id
    pub client_order_id: Option<String>,

    /// Unified symbol
    pub symbol: Symbol,

    /// Creation timestamp
    pub timestamp: Option<Timestamp>,

    /// Timestamp of the most recent fill
    pub last_trade_timestamp: Option<Timestamp>,

    /// Order type
    pub order_type: Option<OrderType>,

    /// Order side
    pub side: OrderSide,

    /// Limit price
    pub price: Option<Decimal>,

    /// Ordered amount
    pub amount: Option<Decimal>,

    /// Filled amount
    pub filled: Decimal,

    /// Amount still open
    pub remaining: Option<Decimal>,

    /// Total cost of the fills
    pub cost: Decimal,

    /// Volume-weighted average fill price
    pub average: Option<Decimal>,

    /// Order status
    pub status: OrderStatus,

    /// Accumulated fee
    pub fee: Option<Fee>,

    /// Fills applied to this order
    #[serde(default)]
    pub trades: Vec<Trade>,

    /// Raw exchange payload
    #[serde(default)]
    pub info: serde_json::Value,
}

impl Order {
    /// Creates an open order with nothing filled.
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<Symbol>,
        side: OrderSide,
        amount: Option<Decimal>,
        price: Option<Decimal>,
    ) -> Self {
        Self {
            id: id.into(),
            client_order_id: None,
            symbol: symbol.into(),
            timestamp: None,
            last_trade_timestamp: None,
            order_type: price.map(|_| OrderType::Limit),
            side,
            price,
            amount,
            filled: Decimal::ZERO,
            remaining: amount,
            cost: Decimal::ZERO,
            average: None,
            status: OrderStatus::Open,
            fee: None,
            trades: Vec::new(),
            info: serde_json::Value::Null,
        }
    }

    /// Sets the client order id.
    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    /// Applies one fill.
    ///
    /// `cost` and `average` are recomputed from the full trade list, `filled`
    /// grows by the fill amount, and `remaining` is `amount - filled`. A fill
    /// whose trade id was already applied is ignored. Returns `true` when the
    /// fill changed the order.
    pub fn apply_fill(&mut self, trade: &Trade) -> bool {
        if let Some(id) = trade.id.as_deref()
            && self.trades.iter().any(|t| t.id.as_deref() == Some(id))
        {
            return false;
        }

        self.trades.push(trade.clone());
        self.last_trade_timestamp = Some(
            self.last_trade_timestamp
                .map_or(trade.timestamp, |ts| ts.max(trade.timestamp)),
        );

        let (total_cost, total_amount) = self
            .trades
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(cost, amount), t| {
                (cost + t.cost, amount + t.amount)
            });
        self.cost = total_cost;
        if total_amount > Decimal::ZERO {
            self.average = Some(total_cost / total_amount);
        }

        self.filled += trade.amount;
        if let Some(amount) = self.amount {
            let remaining = (amount - self.filled).max(Decimal::ZERO);
            self.remaining = Some(remaining);
            if remaining.is_zero() && self.status == OrderStatus::Open {
                self.status = OrderStatus::Closed;
            }
        }

        if let Some(trade_fee) = &trade.fee {
            let fee = self
                .fee
                .get_or_insert_with(|| Fee::new(trade_fee.currency.clone(), Decimal::ZERO));
            if fee.currency == trade_fee.currency {
                fee.cost += trade_fee.cost;
            }
        }

        true
    }

    /// Merges a newer update of the same order into this one.
    ///
    /// Fields reported by `newer` win. Fill history, fee and identifiers the
    /// update does not carry are kept from `self`.
    pub fn merge_update(&mut self, newer: Order) {
        let previous = std::mem::replace(self, newer);
        if self.client_order_id.is_none() {
            self.client_order_id = previous.client_order_id;
        }
        if self.timestamp.is_none() {
            self.timestamp = previous.timestamp;
        }
        if self.order_type.is_none() {
            self.order_type = previous.order_type;
        }
        if self.trades.is_empty() && !previous.trades.is_empty() {
            self.trades = previous.trades;
            self.filled = self.filled.max(previous.filled);
            self.cost = previous.cost;
            self.average = previous.average;
            self.last_trade_timestamp = previous.last_trade_timestamp;
            if let Some(amount) = self.amount {
                self.remaining = Some((amount - self.filled).max(Decimal::ZERO));
            }
        }
        if self.fee.is_none() {
            self.fee = previous.fee;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(id: &str, price: Decimal, amount: Decimal, fee: Decimal) -> Trade {
        Trade::new("BTC/USDT", OrderSide::Buy, price, amount, 1_700_000_000_000)
            .with_id(id)
            .with_order("o-1")
            .with_fee(Fee::new("USDT", fee))
    }

    #[test]
    fn test_apply_fill_accumulates_exactly() {
        let mut order = Order::new("o-1", "BTC/USDT", OrderSide::Buy, Some(dec!(1.0)), Some(dec!(101)));

        assert!(order.apply_fill(&fill("t1", dec!(100), dec!(0.3), dec!(0.03))));
        assert!(order.apply_fill(&fill("t2", dec!(102), dec!(0.2), dec!(0.0204))));

        assert_eq!(order.filled, dec!(0.5));
        assert_eq!(order.remaining, Some(dec!(0.5)));
        assert_eq!(order.cost, dec!(50.4));
        assert_eq!(order.average, Some(dec!(100.8)));
        assert_eq!(order.fee.as_ref().map(|f| f.cost), Some(dec!(0.0504)));
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.trades.len(), 2);
    }

    #[test]
    fn test_apply_fill_closes_fully_filled_order() {
        let mut order = Order::new("o-1", "BTC/USDT", OrderSide::Buy, Some(dec!(0.1)), Some(dec!(100)));
        order.apply_fill(&fill("t1", dec!(100), dec!(0.1), dec!(0)));
        assert_eq!(order.remaining, Some(dec!(0)));
        assert_eq!(order.status, OrderStatus::Closed);
    }

    #[test]
    fn test_apply_fill_ignores_duplicate_trade_id() {
        let mut order = Order::new("o-1", "BTC/USDT", OrderSide::Buy, Some(dec!(1)), None);
        let t = fill("t1", dec!(100), dec!(0.3), dec!(0.03));
        assert!(order.apply_fill(&t));
        assert!(!order.apply_fill(&t));
        assert_eq!(order.filled, dec!(0.3));
    }

    #[test]
    fn test_merge_update_keeps_fill_history() {
        let mut order = Order::new("o-1", "BTC/USDT", OrderSide::Buy, Some(dec!(1)), Some(dec!(100)))
            .with_client_order_id("c-1");
        order.apply_fill(&fill("t1", dec!(100), dec!(0.4), dec!(0.04)));

        let update = Order::new("o-1", "BTC/USDT", OrderSide::Buy, Some(dec!(1)), Some(dec!(100)))
            .with_status(OrderStatus::Canceled);
        order.merge_update(update);

        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(order.client_order_id.as_deref(), Some("c-1"));
        assert_eq!(order.trades.len(), 1);
        assert_eq!(order.filled, dec!(0.4));
        assert_eq!(order.remaining, Some(dec!(0.6)));
    }
}
