//! Domain error types.

use thiserror::Error;

use crate::money::Money;

/// Errors that can occur while building or validating domain values.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A monetary amount was rejected by the fee calculator.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Money, reason: &'static str },

    /// The fee policy parameters are out of range.
    #[error("Invalid fee policy: {0}")]
    InvalidFeePolicy(String),

    /// A stored status string did not name a known status.
    #[error("Unknown {kind} status: {value}")]
    UnknownStatus { kind: &'static str, value: String },

    /// A stored login method string did not name a known method.
    #[error("Unknown login method: {0}")]
    UnknownLoginMethod(String),

    /// A stored fee breakdown violates the fee invariants.
    #[error("Inconsistent fee breakdown: {0}")]
    InconsistentFees(String),
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
