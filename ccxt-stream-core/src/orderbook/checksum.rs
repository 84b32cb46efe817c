//! CRC32 checksums over the top levels of a book.

use super::side::{BookSide, OrderBookEntry};

/// Order in which levels are concatenated into the checksum payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumLayout {
    /// `bid0:size0:ask0:size0:bid1:size1:...`; a missing level is skipped.
    #[default]
    Interleaved,
    /// Every bid level, then every ask level.
    BidsThenAsks,
}

/// How an exchange builds and reports its book checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumFormat {
    /// Levels per side included in the payload.
    pub depth: usize,
    /// Concatenation order.
    pub layout: ChecksumLayout,
    /// Separator between fields.
    pub separator: String,
    /// The exchange reports the CRC as a signed 32-bit integer.
    pub signed: bool,
}

impl Default for ChecksumFormat {
    fn default() -> Self {
        Self {
            depth: 25,
            layout: ChecksumLayout::Interleaved,
            separator: ":".to_string(),
            signed: true,
        }
    }
}

impl ChecksumFormat {
    /// Interleaved signed CRC32 over `depth` levels.
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    /// Sets the layout.
    pub fn with_layout(mut self, layout: ChecksumLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Report the CRC as unsigned.
    pub fn unsigned(mut self) -> Self {
        self.signed = false;
        self
    }

    /// Builds the payload string the CRC is computed over.
    pub fn payload(&self, bids: &BookSide, asks: &BookSide) -> String {
        let bids = bids.top(Some(self.depth));
        let asks = asks.top(Some(self.depth));
        let mut fields: Vec<String> = Vec::with_capacity((bids.len() + asks.len()) * 2);
        let mut push = |level: &OrderBookEntry| {
            fields.push(level.price.normalize().to_string());
            fields.push(level.amount.normalize().to_string());
        };

        match self.layout {
            ChecksumLayout::Interleaved => {
                for i in 0..self.depth {
                    if let Some(bid) = bids.get(i) {
                        push(bid);
                    }
                    if let Some(ask) = asks.get(i) {
                        push(ask);
                    }
                }
            }
            ChecksumLayout::BidsThenAsks => {
                bids.iter().chain(asks.iter()).for_each(&mut push);
            }
        }

        fields.join(&self.separator)
    }

    /// Computes the checksum as the exchange would report it.
    pub fn compute(&self, bids: &BookSide, asks: &BookSide) -> i64 {
        let crc = crc32fast::hash(self.payload(bids, asks).as_bytes());
        if self.signed {
            i64::from(crc as i32)
        } else {
            i64::from(crc)
        }
    }
}
