//! Payment gateway contract and implementations.

pub mod http;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::Money;

use crate::error::GatewayError;

pub use http::HttpInvoiceGateway;
pub use memory::InMemoryPaymentGateway;

/// A request for a payment invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRequest {
    /// Repeating a request with the same key returns the same invoice.
    /// The transaction id is used here.
    pub idempotency_key: String,
    pub amount: Money,
    pub payer_email: String,
    pub description: String,
}

/// An invoice issued by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    /// Gateway reference for the invoice.
    pub reference: String,
    /// Page where the buyer pays.
    pub redirect_url: String,
    /// Payment deadline, when the gateway reports one.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Trait for issuing payment invoices.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an invoice for `request.amount`, payable by `request.payer_email`.
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
        (**self).create_invoice(request).await
    }
}
