//! Error types for the transport layer.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while talking to the PVK API.
#[derive(Debug, Error, Clone)]
pub enum ApiError {
    /// Network/HTTP request failed before a response arrived
    #[error("Network error: {message}")]
    Network { message: String },

    /// Server answered with a non-success status code
    #[error("Request to {resource} failed with status {status}: {message}")]
    Status {
        resource: String,
        status: u16,
        message: String,
    },

    /// Response body was not the JSON we expected
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    /// URL parsing/construction failed
    #[error("URL error: {message}")]
    UrlError { message: String },
}

impl ApiError {
    /// Returns the HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the token was rejected and the session has been cleared.
    pub fn needs_reauth(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }

    /// Returns true if an `If-Match` precondition did not hold, i.e. local state is stale.
    pub fn is_precondition_failed(&self) -> bool {
        self.status() == Some(StatusCode::PRECONDITION_FAILED.as_u16())
    }

    /// Returns true if this error is potentially transient and retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode {
                message: err.to_string(),
            }
        } else {
            ApiError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::UrlError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            resource: "signups".to_string(),
            status: code,
            message: String::new(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(status(401).needs_reauth());
        assert!(!status(403).needs_reauth());
        assert!(status(412).is_precondition_failed());
        assert!(status(503).is_retryable());
        assert!(!status(422).is_retryable());
        assert!(ApiError::Network {
            message: "reset".to_string()
        }
        .is_retryable());
        assert_eq!(
            ApiError::Decode {
                message: String::new()
            }
            .status(),
            None
        );
    }
}
