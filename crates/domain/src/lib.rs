//! Domain model for the marketplace purchase system.
//!
//! This crate is pure: no I/O, no clocks read implicitly. It provides:
//! - `Money`, an exact decimal amount with a single rounding policy
//! - `FeePolicy`, the only place purchase fees are computed
//! - `Listing` and `Transaction` records with their status state machines

pub mod error;
pub mod fees;
pub mod listing;
pub mod money;
pub mod transaction;

pub use error::{DomainError, Result};
pub use fees::{FeeBreakdown, FeePolicy};
pub use listing::{Listing, ListingDraft, ListingStatus, LoginMethod};
pub use money::Money;
pub use transaction::{PaymentStatus, Transaction, TransactionStatus};
