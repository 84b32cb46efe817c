//! Detail structures for boxed error variants.

use serde_json::Value;
use std::fmt;

/// Details of a well-formed error frame sent by the exchange.
///
/// # Example
///
/// ```rust
/// use ccxt_stream_core::error::ExchangeErrorDetails;
///
/// let details = ExchangeErrorDetails::new("10001", "Invalid channel");
/// assert_eq!(details.code, "10001");
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ExchangeErrorDetails {
    /// Error code as reported by the exchange (numeric or alphanumeric).
    pub code: String,
    /// Descriptive message from the exchange.
    pub message: String,
    /// Raw frame, kept for debugging.
    pub data: Option<Value>,
}

impl ExchangeErrorDetails {
    /// Creates details with a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Creates details carrying the raw inbound frame.
    pub fn with_data(code: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: Some(data),
        }
    }
}

impl fmt::Display for ExchangeErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)
    }
}

/// Why an order book lost integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutOfSyncReason {
    /// A delta arrived whose sequence is not the expected next value.
    SequenceGap {
        /// Sequence the book expected
        expected: u64,
        /// Sequence carried by the delta
        received: u64,
    },
    /// The exchange-supplied checksum does not match the local top-N levels.
    ChecksumMismatch {
        /// Checksum carried in the inbound frame
        expected: i64,
        /// Checksum computed over the local book
        computed: i64,
    },
    /// A delta was applied to a book that has not been (re)synchronized with a snapshot.
    NotSynchronized,
    /// A delta without a sequence number reached a strictly sequenced book.
    MissingSequence,
}

impl fmt::Display for OutOfSyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SequenceGap { expected, received } => {
                write!(f, "sequence gap (expected {expected}, received {received})")
            }
            Self::ChecksumMismatch { expected, computed } => {
                write!(f, "checksum mismatch (expected {expected}, computed {computed})")
            }
            Self::NotSynchronized => write!(f, "book awaiting snapshot"),
            Self::MissingSequence => write!(f, "delta carries no sequence"),
        }
    }
}

/// Details of an order-book integrity failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfSyncDetails {
    /// Symbol of the affected book.
    pub symbol: String,
    /// What was detected.
    pub reason: OutOfSyncReason,
}

impl fmt::Display for OutOfSyncDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.symbol, self.reason)
    }
}
