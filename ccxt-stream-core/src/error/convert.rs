//! From implementations for converting into [`Error`].

use crate::error::{Error, NetworkError, ParseError};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Error as TungError;

/// Maximum length for messages copied out of inbound frames.
pub(crate) const MAX_ERROR_MESSAGE_LEN: usize = 1024;

/// Truncates a string to a maximum length, adding "... (truncated)" if needed.
pub(crate) fn truncate_message(mut msg: String) -> String {
    if msg.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !msg.is_char_boundary(cut) {
            cut -= 1;
        }
        msg.truncate(cut);
        msg.push_str("... (truncated)");
    }
    msg
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::Transport(Box::new(e))
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(Box::new(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(Box::new(ParseError::from(e)))
    }
}

impl From<rust_decimal::Error> for Error {
    fn from(e: rust_decimal::Error) -> Self {
        Error::Parse(Box::new(ParseError::Decimal(e)))
    }
}

impl From<TungError> for NetworkError {
    fn from(e: TungError) -> Self {
        match e {
            TungError::ConnectionClosed | TungError::AlreadyClosed => NetworkError::ClosedByPeer {
                code: None,
                reason: truncate_message(e.to_string()),
            },
            TungError::Url(_) => NetworkError::InvalidUrl(truncate_message(e.to_string())),
            TungError::Http(response) if response.status().is_client_error() => {
                NetworkError::Transport(Arc::new(TungError::Http(response)))
            }
            TungError::Io(_) | TungError::Tls(_) | TungError::Http(_) => {
                NetworkError::ConnectionFailed(truncate_message(e.to_string()))
            }
            TungError::WriteBufferFull(_) => NetworkError::SendFailed(truncate_message(e.to_string())),
            other => NetworkError::Transport(Arc::new(other)),
        }
    }
}

impl From<TungError> for Error {
    fn from(e: TungError) -> Self {
        Error::Transport(Box::new(NetworkError::from(e)))
    }
}
