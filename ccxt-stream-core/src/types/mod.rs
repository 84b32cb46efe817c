//! Unified records produced by adapters and stored by the caches.
//!
//! Prices, amounts and costs are `Decimal` throughout; timestamps are
//! milliseconds since the Unix epoch.

mod ohlcv;
mod order;
mod trade;

pub use ohlcv::Ohlcv;
pub use order::{Order, OrderSide, OrderStatus, OrderType};
pub use trade::{TakerOrMaker, Trade};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Millisecond timestamp.
pub type Timestamp = i64;

/// Unified symbol such as `BTC/USDT`.
pub type Symbol = String;

/// Trading fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// Fee currency code.
    pub currency: String,
    /// Fee amount in `currency`.
    pub cost: Decimal,
    /// Fee rate, when reported.
    pub rate: Option<Decimal>,
}

impl Fee {
    /// Creates a fee without a rate.
    pub fn new(currency: impl Into<String>, cost: Decimal) -> Self {
        Self {
            currency: currency.into(),
            cost,
            rate: None,
        }
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}
