//! Error types of the dispatch layer
//!
//! `RestError` is the structured envelope a handler raises on purpose.
//! Everything else a handler returns is opaque and rendered as plain text.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;

/// Boxed error used for body streams and opaque handler failures
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Structured application error, rendered as `{"error": code, "reason": reason}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{reason}")]
pub struct RestError {
    #[serde(rename = "error")]
    pub code: i64,
    pub reason: String,
}

impl RestError {
    pub fn new(code: i64, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Build a [`RestError`] with a formatted reason.
///
/// ```
/// let err = restmux::rest_error!(404, "no user with id {}", 7);
/// assert_eq!(err.reason, "no user with id 7");
/// ```
#[macro_export]
macro_rules! rest_error {
    ($code:expr, $($arg:tt)+) => {
        $crate::rest::RestError::new($code, format!($($arg)+))
    };
}

/// Error returned by a handler
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Intentional failure, answered with the JSON envelope
    #[error(transparent)]
    Rest(#[from] RestError),
    /// Any other failure, answered with its text and a status code
    #[error(transparent)]
    Other(BoxError),
}

impl HandlerError {
    pub fn other<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Other(err.into())
    }
}

impl From<ContextError> for HandlerError {
    fn from(err: ContextError) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<BoxError> for HandlerError {
    fn from(err: BoxError) -> Self {
        Self::Other(err)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Other(message.into())
    }
}

/// Failures of the [`Context`](super::Context) accessors
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("address {addr}: {reason}")]
    Address { addr: String, reason: &'static str },
    #[error("failed to read request body: {0}")]
    Body(BoxError),
    #[error("request body is empty")]
    EmptyBody,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures while parsing query and form-encoded body values
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("invalid URL escape \"{0}\"")]
    InvalidEscape(String),
    #[error("invalid semicolon separator in query")]
    Semicolon,
    #[error("failed to read form body: {0}")]
    Body(BoxError),
    #[error(transparent)]
    Decode(#[from] serde_urlencoded::de::Error),
}
