//! Handler results

use hyper::body::Bytes;
use serde::Serialize;
use std::fmt;

/// Value a handler produces on success.
///
/// The response resource type decides how it is written: `Json` needs
/// `application/json`, any other resource type needs `Bytes`.
pub enum Reply {
    /// Nothing to send; written as `{}` for JSON resources
    Empty,
    /// Serialized when the response is encoded
    Json(Box<dyn JsonPayload>),
    /// Written verbatim, or as a base64 JSON string for JSON resources
    Bytes(Bytes),
}

impl Reply {
    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + 'static,
    {
        Self::Json(Box::new(value))
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Json(_) => "json",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

impl From<Bytes> for Reply {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for Reply {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(data))
    }
}

impl From<serde_json::Value> for Reply {
    fn from(value: serde_json::Value) -> Self {
        Self::json(value)
    }
}

/// Type-erased serializable reply body
pub trait JsonPayload: Send {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T> JsonPayload for T
where
    T: Serialize + Send,
{
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
