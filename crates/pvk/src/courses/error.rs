//! Error types for the course sign-up workflow.

use super::payment::PaymentError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur while selecting, reserving or paying for courses.
#[derive(Debug, Error, Clone)]
pub enum SignupError {
    /// Nobody is logged in
    #[error("No active session")]
    NoSession,

    /// The course is already selected or signed up for
    #[error("Course {course} is already selected or signed up for")]
    AlreadyChosen { course: String },

    /// The course's time slots collide with already chosen courses
    #[error("Course {course} overlaps with {}", .conflicts.join(", "))]
    Overlap {
        course: String,
        conflicts: Vec<String>,
    },

    /// `pay` was called without any reserved signups
    #[error("No reserved courses to pay for")]
    NothingToPay,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Signup creation failed and re-creating the deleted selection failed too.
    /// The selection is lost.
    #[error("Signup for course {course} failed ({source}), restoring the selection failed as well: {compensation}")]
    CompensationFailed {
        course: String,
        source: StoreError,
        compensation: StoreError,
    },

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl SignupError {
    /// Returns the HTTP status code behind this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SignupError::Store(err) | SignupError::CompensationFailed { source: err, .. } => {
                err.status()
            }
            _ => None,
        }
    }
}
