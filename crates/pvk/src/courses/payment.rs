//! Payment provider hand-off.
//!
//! The checkout dialog itself belongs to a payment SDK. The controller only
//! computes what to charge, opens the dialog through [`PaymentProvider`] and
//! confirms the resulting token with the PVK API.

use async_trait::async_trait;
use thiserror::Error;

/// What the checkout dialog should charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOptions {
    /// Total in the smallest currency unit
    pub amount: u64,
    pub currency: String,
    pub description: String,
}

/// Errors reported by a payment provider.
#[derive(Debug, Error, Clone)]
pub enum PaymentError {
    #[error("Payment declined: {message}")]
    Declined { message: String },

    #[error("Payment provider error: {message}")]
    Provider { message: String },
}

/// A checkout dialog.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Opens the dialog for `options`.
    ///
    /// Resolves to the provider's payment token, or `None` if the user closed
    /// the dialog without paying.
    async fn open(&self, options: PaymentOptions) -> Result<Option<String>, PaymentError>;
}
