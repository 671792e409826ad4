use common::{ListingId, TransactionId};
use domain::{DomainError, ListingStatus, TransactionStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the listing or transaction store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The listing does not exist.
    #[error("Listing not found: {0}")]
    ListingNotFound(ListingId),

    /// The transaction does not exist.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// A listing with this id already exists.
    #[error("Listing already exists: {0}")]
    DuplicateListing(ListingId),

    /// A non-terminal transaction already references the listing.
    #[error("A pending transaction already exists for listing {listing_id}")]
    DuplicateTransaction { listing_id: ListingId },

    /// The listing is not in a status that allows the requested transition.
    #[error("Cannot {action} listing {listing_id} in {current} status")]
    ListingTransition {
        listing_id: ListingId,
        action: &'static str,
        current: ListingStatus,
    },

    /// The transaction is not in a status that allows the requested transition.
    #[error("Cannot {action} transaction {transaction_id} in {current} status")]
    TransactionTransition {
        transaction_id: TransactionId,
        action: &'static str,
        current: TransactionStatus,
    },

    /// The backing store refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be turned back into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(#[from] DomainError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
