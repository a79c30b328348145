//! Error types for protocol values.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ItemError>;

/// Errors raised while building or reading items.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// The JSON value is not an object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },

    /// The item has no usable identity key.
    #[error("item has no identity key")]
    MissingId,

    /// The payload document could not be parsed.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ItemError {
    fn from(err: serde_json::Error) -> Self {
        ItemError::Malformed(err.to_string())
    }
}
