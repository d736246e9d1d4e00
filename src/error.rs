//! Error types.

use std::fmt;

/// The error type returned by onion's infrastructure operations.
///
/// Request-level failures never surface here: they become status codes on
/// the response (see [`Data`](crate::Data)). This type covers binding to a
/// port and accepting connections.
#[derive(Debug)]
pub struct Error(std::io::Error);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "io: {}", self.0)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self(e)
    }
}

/// Failure of [`Data::json`](crate::Data::json) or
/// [`Data::write_json`](crate::Data::write_json).
///
/// By the time a caller sees one of these, the matching status code has
/// already been written to the response. Returning it lets the callback
/// stop early or add its own handling.
#[derive(Debug)]
pub enum JsonError {
    /// The body is not valid JSON, does not fit the target type, carries a
    /// field the target does not declare, or is empty.
    Decode(serde_json::Error),
    /// The body holds more than one top-level JSON value.
    TrailingData(serde_json::Error),
    /// The value could not be serialized.
    Encode(serde_json::Error),
}

impl JsonError {
    /// The status code written to the response for this failure.
    pub fn status(&self) -> u16 {
        match self {
            Self::Decode(_) | Self::TrailingData(_) => 400,
            Self::Encode(_) => 500,
        }
    }

    /// `true` for failures caused by the request payload.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "invalid request: {e}"),
            Self::TrailingData(e) => write!(f, "extra data in request: {e}"),
            Self::Encode(e) => write!(f, "invalid json object: {e}"),
        }
    }
}

impl std::error::Error for JsonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) | Self::TrailingData(e) | Self::Encode(e) => Some(e),
        }
    }
}
