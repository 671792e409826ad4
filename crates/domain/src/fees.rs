//! Purchase fee calculation.
//!
//! Every fee amount in the system is produced here. Callers never add or
//! subtract fees themselves, so the breakdown invariants hold by construction:
//!
//! ```text
//! total_buyer_paid = item_price + platform_fee_amount
//! seller_received  = item_price - disbursement_fee
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::money::Money;

/// Platform fee policy: a percentage charged to the buyer on top of the
/// item price plus a fixed disbursement fee deducted from the seller payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    platform_fee_rate: Decimal,
    disbursement_fee: Money,
}

impl FeePolicy {
    /// Creates a fee policy.
    ///
    /// The rate must lie in `[0, 1)` and the disbursement fee must not be negative.
    pub fn new(platform_fee_rate: Decimal, disbursement_fee: Money) -> Result<Self> {
        if platform_fee_rate < Decimal::ZERO || platform_fee_rate >= Decimal::ONE {
            return Err(DomainError::InvalidFeePolicy(format!(
                "platform fee rate {platform_fee_rate} must be in [0, 1)"
            )));
        }
        if disbursement_fee.is_negative() {
            return Err(DomainError::InvalidFeePolicy(format!(
                "disbursement fee {disbursement_fee} must not be negative"
            )));
        }
        Ok(Self {
            platform_fee_rate,
            disbursement_fee,
        })
    }

    /// Returns the platform fee rate.
    pub fn platform_fee_rate(&self) -> Decimal {
        self.platform_fee_rate
    }

    /// Returns the fixed disbursement fee.
    pub fn disbursement_fee(&self) -> Money {
        self.disbursement_fee
    }

    /// Computes the fee breakdown for a listing price.
    ///
    /// The platform fee is rounded half-up to whole currency units exactly
    /// once; every other amount is an exact sum or difference.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidAmount`] if the price is not positive,
    /// does not exceed the disbursement fee, or is too large to add fees to.
    pub fn compute_fees(&self, price: Money) -> Result<FeeBreakdown> {
        if !price.is_positive() {
            return Err(DomainError::InvalidAmount {
                amount: price,
                reason: "price must be positive",
            });
        }

        let too_large = || DomainError::InvalidAmount {
            amount: price,
            reason: "price is too large",
        };
        let platform_fee_amount = price
            .checked_times(self.platform_fee_rate)
            .ok_or_else(too_large)?
            .round_to_unit();
        let total_buyer_paid = price
            .checked_add(platform_fee_amount)
            .ok_or_else(too_large)?;
        let seller_received = price
            .checked_sub(self.disbursement_fee)
            .ok_or_else(too_large)?;
        if !seller_received.is_positive() {
            return Err(DomainError::InvalidAmount {
                amount: price,
                reason: "price must exceed the disbursement fee",
            });
        }

        Ok(FeeBreakdown {
            item_price: price,
            platform_fee_amount,
            disbursement_fee: self.disbursement_fee,
            total_buyer_paid,
            seller_received,
        })
    }
}

impl Default for FeePolicy {
    /// 5% platform fee and a fixed disbursement fee of 2000.
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(5, 2),
            disbursement_fee: Money::from_units(2000),
        }
    }
}

/// The monetary split of one purchase. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    item_price: Money,
    platform_fee_amount: Money,
    disbursement_fee: Money,
    total_buyer_paid: Money,
    seller_received: Money,
}

impl FeeBreakdown {
    /// Rebuilds a breakdown from persisted amounts, checking the invariants.
    pub fn from_stored(
        item_price: Money,
        platform_fee_amount: Money,
        disbursement_fee: Money,
        total_buyer_paid: Money,
        seller_received: Money,
    ) -> Result<Self> {
        if item_price.checked_add(platform_fee_amount) != Some(total_buyer_paid) {
            return Err(DomainError::InconsistentFees(format!(
                "total {total_buyer_paid} != price {item_price} + platform fee {platform_fee_amount}"
            )));
        }
        if item_price.checked_sub(disbursement_fee) != Some(seller_received) {
            return Err(DomainError::InconsistentFees(format!(
                "payout {seller_received} != price {item_price} - disbursement fee {disbursement_fee}"
            )));
        }
        Ok(Self {
            item_price,
            platform_fee_amount,
            disbursement_fee,
            total_buyer_paid,
            seller_received,
        })
    }

    pub fn item_price(&self) -> Money {
        self.item_price
    }

    pub fn platform_fee_amount(&self) -> Money {
        self.platform_fee_amount
    }

    pub fn disbursement_fee(&self) -> Money {
        self.disbursement_fee
    }

    /// Amount the buyer is invoiced for.
    pub fn total_buyer_paid(&self) -> Money {
        self.total_buyer_paid
    }

    /// Amount paid out to the seller.
    pub fn seller_received(&self) -> Money {
        self.seller_received
    }
}
