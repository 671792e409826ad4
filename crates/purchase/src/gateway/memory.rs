//! In-memory payment gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Invoice, InvoiceRequest, PaymentGateway};
use crate::error::GatewayError;

const CHECKOUT_URL: &str = "https://checkout.xendit.co/web";

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    invoices: HashMap<String, (InvoiceRequest, Invoice)>,
    next_id: u32,
    fail_on_create: bool,
    delay: Option<Duration>,
}

/// In-memory payment gateway for tests and local development.
///
/// Invoices are idempotent per key: repeating a request with the same key
/// returns the invoice issued the first time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to reject invoice requests.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Delays every invoice request, to simulate a slow gateway.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Returns the number of distinct invoices issued.
    pub async fn invoice_count(&self) -> usize {
        self.state.read().await.invoices.len()
    }

    /// Returns the request that produced the invoice for `idempotency_key`.
    pub async fn request_for(&self, idempotency_key: &str) -> Option<InvoiceRequest> {
        self.state
            .read()
            .await
            .invoices
            .get(idempotency_key)
            .map(|(request, _)| request.clone())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;

        if state.fail_on_create {
            return Err(GatewayError::Unavailable("invoice creation declined".to_string()));
        }

        if let Some((_, invoice)) = state.invoices.get(&request.idempotency_key) {
            return Ok(invoice.clone());
        }

        state.next_id += 1;
        let reference = format!("inv_{:06}", state.next_id);
        let invoice = Invoice {
            redirect_url: format!("{CHECKOUT_URL}/{reference}"),
            reference,
            expires_at: None,
        };
        state.invoices.insert(
            request.idempotency_key.clone(),
            (request, invoice.clone()),
        );

        Ok(invoice)
    }
}
