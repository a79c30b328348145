//! Error types for the sync engine.

use ledgersync_protocol::ItemError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error reported by a remote capability.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote has no record with this identity key.
    #[error("{doc_type} record {id:?} not found")]
    NotFound {
        /// Document type searched.
        doc_type: String,
        /// Identity key searched.
        id: String,
    },

    /// The remote refused a broadcast.
    #[error("broadcast rejected: {0}")]
    Rejected(String),

    /// An item did not have the expected shape.
    #[error("invalid item: {0}")]
    Protocol(#[from] ItemError),

    /// Mutations need an acting identity and none could be resolved.
    #[error("no acting identity available")]
    MissingIdentity,

    /// A single item exceeds the size budget on its own.
    #[error("item of {bytes} bytes can never fit the {budget} byte budget")]
    PayloadTooLarge {
        /// Encoded size of the offending item.
        bytes: usize,
        /// Size budget, in bytes.
        budget: usize,
    },

    /// Pagination did not terminate within the configured page limit.
    #[error("pagination did not terminate after {pages} pages")]
    PaginationOverflow {
        /// Number of pages fetched.
        pages: usize,
    },

    /// No collection is registered under this document type.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
}

impl SyncError {
    /// Creates a retryable remote error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn remote_fatal(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
