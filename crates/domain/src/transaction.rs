//! Purchase transactions.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{ListingId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::fees::FeeBreakdown;
use crate::listing::Listing;

/// Business status of a transaction.
///
/// ```text
/// Pending ──┬──► Completed   (payment confirmed)
///           ├──► Failed      (invoice creation failed, listing compensated)
///           └──► Expired     (payment window elapsed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Expired,
}

impl TransactionStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "expired" => Ok(TransactionStatus::Expired),
            other => Err(DomainError::UnknownStatus {
                kind: "transaction",
                value: other.to_string(),
            }),
        }
    }
}

/// Status reported by the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::UnknownStatus {
                kind: "payment",
                value: other.to_string(),
            }),
        }
    }
}

/// Durable record of one purchase attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub listing_id: ListingId,
    pub fees: FeeBreakdown,
    pub status: TransactionStatus,
    pub payment_status: PaymentStatus,
    /// Gateway invoice reference, set once invoice creation succeeds.
    pub payment_gateway_ref: Option<String>,
    /// Payment deadline, set together with the gateway reference.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a Pending transaction for `buyer_id` purchasing `listing`.
    pub fn pending(
        buyer_id: UserId,
        listing: &Listing,
        fees: FeeBreakdown,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            buyer_id,
            seller_id: listing.seller_id,
            listing_id: listing.id,
            fees,
            status: TransactionStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_gateway_ref: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the payment window passed without payment.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending
            && self.payment_status == PaymentStatus::Pending
            && self.expires_at.is_some_and(|deadline| deadline < now)
    }

    /// Returns true if `user_id` is the buyer or the seller.
    pub fn involves(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}
