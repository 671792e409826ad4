//! Purchase orchestration for marketplace listings.
//!
//! A purchase is a linear workflow with one compensation branch:
//! 1. Validate the buyer is not the seller
//! 2. Reserve the listing (atomic conditional update)
//! 3. Compute fees
//! 4. Persist a Pending transaction
//! 5. Request a gateway invoice keyed by the transaction id
//!
//! Any failure after step 2 releases the listing and fails the transaction.
//! The [`ExpirySweeper`] expires unpaid transactions and releases their
//! listings once the payment window has passed.

pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod sweeper;
pub mod workflow;

pub use error::{GatewayError, PurchaseError, Result};
pub use gateway::{
    HttpInvoiceGateway, InMemoryPaymentGateway, Invoice, InvoiceRequest, PaymentGateway,
};
pub use orchestrator::{Buyer, PurchaseConfig, PurchaseOrchestrator, PurchaseReceipt};
pub use sweeper::{ExpirySweeper, SweepReport};
