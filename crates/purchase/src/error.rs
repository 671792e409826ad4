//! Purchase error types.

use std::time::Duration;

use common::{ListingId, TransactionId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors returned by a payment gateway adapter.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway answered with a non-success status.
    #[error("Gateway rejected invoice (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The request never produced a response.
    #[error("Gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response could not be understood.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    /// The gateway did not answer within the configured bound.
    #[error("Gateway timed out after {0:?}")]
    Timeout(Duration),

    /// The gateway is not accepting requests.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during a purchase.
#[derive(Debug, Error)]
pub enum PurchaseError {
    /// The buyer owns the listing. Nothing was changed.
    #[error("You cannot purchase your own listing")]
    SelfPurchaseForbidden,

    /// The listing does not exist or is not Active. Nothing was changed.
    #[error("Listing {0} is no longer available for purchase")]
    ListingUnavailable(ListingId),

    /// The gateway refused or failed to issue an invoice. The listing was
    /// released and the transaction marked Failed.
    #[error("Payment initiation failed for transaction {transaction_id}: {source}")]
    PaymentInitiationFailed {
        transaction_id: TransactionId,
        #[source]
        source: GatewayError,
    },

    /// The listing or transaction store failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The price was rejected by the fee calculator.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// An unexpected failure, such as a panicked workflow task.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PurchaseError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PurchaseError::SelfPurchaseForbidden => "self_purchase",
            PurchaseError::ListingUnavailable(_) => "listing_unavailable",
            PurchaseError::PaymentInitiationFailed { .. } => "payment_initiation_failed",
            PurchaseError::StoreUnavailable(_) => "store_unavailable",
            PurchaseError::Domain(_) => "invalid_amount",
            PurchaseError::Internal(_) => "internal",
        }
    }
}

/// Convenience type alias for purchase results.
pub type Result<T> = std::result::Result<T, PurchaseError>;
