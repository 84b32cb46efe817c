//! Trade type definitions

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderSide;
use super::{Fee, Symbol, Timestamp};

/// Public trade or private fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trade ID
    pub id: Option<String>,

    /// Order ID that this trade belongs to (private fills)
    pub order: Option<String>,

    /// Unified symbol
    pub symbol: Symbol,

    /// Trade side (buy or sell)
    pub side: OrderSide,

    /// Whether this is a maker or taker trade
    pub taker_or_maker: Option<TakerOrMaker>,

    /// Trade price
    pub price: Decimal,

    /// Trade amount
    pub amount: Decimal,

    /// Trade cost (price * amount)
    pub cost: Decimal,

    /// Trade fee
    pub fee: Option<Fee>,

    /// Timestamp in milliseconds
    pub timestamp: Timestamp,

    /// Raw exchange payload
    #[serde(default)]
    pub info: serde_json::Value,
}

/// Whether a trade is maker or taker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TakerOrMaker {
    /// Maker (provides liquidity)
    Maker,
    /// Taker (takes liquidity)
    Taker,
}

impl Trade {
    /// Creates a trade; `cost` is computed as `price * amount`.
    pub fn new(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: None,
            order: None,
            symbol: symbol.into(),
            side,
            taker_or_maker: None,
            price,
            amount,
            cost: price * amount,
            fee: None,
            timestamp,
            info: serde_json::Value::Null,
        }
    }

    /// Sets the trade id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Links the trade to an order.
    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order = Some(order_id.into());
        self
    }

    /// Sets the fee.
    pub fn with_fee(mut self, fee: Fee) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Returns `true` if this is a buy trade.
    pub fn is_buy(&self) -> bool {
        matches!(self.side, OrderSide::Buy)
    }
}
