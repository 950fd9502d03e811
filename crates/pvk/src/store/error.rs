//! Error types for resource stores.

use crate::transport::ApiError;
use thiserror::Error;

/// Errors returned by [`ResourceStore`](super::ResourceStore) operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// The request itself failed; any optimistic change has been rolled back
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Update or delete of a record this store has never confirmed
    #[error("No confirmed {resource} record with id {id}")]
    UnknownRecord { resource: String, id: String },

    /// The server confirmed a record without an `_id`
    #[error("Server returned a {resource} record without an id")]
    MissingId { resource: String },

    /// Changes passed to an update were not a JSON object
    #[error("Changes must be a JSON object, got: {changes}")]
    InvalidChanges { changes: String },

    /// A record could not be converted to or from JSON
    #[error("Failed to decode record: {message}")]
    Decode { message: String },
}

impl StoreError {
    /// Returns true if the server rejected a stale version tag.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StoreError::Api(err) if err.is_precondition_failed())
    }

    /// Returns the HTTP status code behind this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Api(err) => err.status(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode {
            message: err.to_string(),
        }
    }
}
