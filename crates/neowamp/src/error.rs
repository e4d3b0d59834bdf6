//! # Error Definitions
//!
//! Failures raised while building, validating, or (de)serializing events.

use crate::kind::MessageKind;

/// Wire-level failures.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The `kind` field carried a code outside the closed set.
    UnknownKind(i64),
    /// The envelope was well-formed JSON but its features or payload did not
    /// match the shape required by its kind.
    Protocol(String),
    /// The input was not valid JSON, or the event could not be rendered.
    Json(String),
    /// A URI failed the dot-separated segment syntax check.
    InvalidUri(String),
    /// The envelope was readable but its kind-specific parts were not.
    Malformed {
        id: String,
        kind: MessageKind,
        invocation_id: Option<String>,
        reason: String,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKind(code) => write!(f, "Unknown message kind: {}", code),
            Self::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Self::Json(msg) => write!(f, "JSON error: {}", msg),
            Self::InvalidUri(uri) => write!(f, "Invalid URI: '{}'", uri),
            Self::Malformed { id, kind, reason, .. } => write!(f, "Malformed {} event {}: {}", kind, id, reason),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
