//! Frame parsing error types.

use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while decoding inbound frames into domain records.
///
/// Uses `Cow<'static, str>` for field names so static names do not allocate:
///
/// ```rust
/// use ccxt_stream_core::error::ParseError;
///
/// let err = ParseError::missing_field("price");
/// let err = ParseError::invalid_value("side", "expected bid or ask");
/// ```
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ParseError {
    /// Failed to parse a decimal number.
    #[error("Failed to parse decimal: {0}")]
    Decimal(#[from] rust_decimal::Error),

    /// The frame is not valid JSON.
    #[error("Failed to deserialize JSON: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// A binary frame was not valid UTF-8.
    #[error("Frame is not valid UTF-8")]
    Utf8,

    /// Missing required field in the frame.
    #[error("Missing required field: {0}")]
    MissingField(Cow<'static, str>),

    /// Invalid value for a field.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name
        field: Cow<'static, str>,
        /// Error message
        message: Cow<'static, str>,
    },
}

impl ParseError {
    /// Creates a `MissingField` error.
    pub fn missing_field(field: impl Into<Cow<'static, str>>) -> Self {
        Self::MissingField(field.into())
    }

    /// Creates an `InvalidValue` error.
    pub fn invalid_value(
        field: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}
