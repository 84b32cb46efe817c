//! Candle type.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamp;

/// One candle. `timestamp` is the open time of the interval and identifies the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlcv {
    /// Interval open time in milliseconds
    pub timestamp: Timestamp,
    /// Open price
    pub open: Decimal,
    /// Highest price
    pub high: Decimal,
    /// Lowest price
    pub low: Decimal,
    /// Close (or latest) price
    pub close: Decimal,
    /// Traded volume
    pub volume: Decimal,
}

impl Ohlcv {
    /// Creates a candle.
    pub fn new(
        timestamp: Timestamp,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}
