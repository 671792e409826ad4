//! HTTP invoice gateway client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Invoice, InvoiceRequest, PaymentGateway};
use crate::error::GatewayError;

/// Invoice API client.
///
/// Sends `POST {base_url}/v2/invoices` with the secret key as the basic-auth
/// username and the idempotency key in `X-IDEMPOTENCY-KEY`, so a retried
/// request for the same transaction never creates a second invoice.
#[derive(Clone)]
pub struct HttpInvoiceGateway {
    client: Client,
    base_url: String,
    secret_key: String,
    invoice_duration: Duration,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    external_id: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    payer_email: &'a str,
    description: &'a str,
    invoice_duration: u64,
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceResponse {
    id: String,
    invoice_url: String,
    #[serde(default)]
    expiry_date: Option<DateTime<Utc>>,
}

impl HttpInvoiceGateway {
    /// Creates a client for the gateway at `base_url`.
    ///
    /// `invoice_duration` is how long the issued invoice stays payable.
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        invoice_duration: Duration,
    ) -> Self {
        Self::with_client(Client::new(), base_url, secret_key, invoice_duration)
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        invoice_duration: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            invoice_duration,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpInvoiceGateway {
    #[tracing::instrument(skip(self, request), fields(external_id = %request.idempotency_key))]
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
        let body = CreateInvoiceBody {
            external_id: &request.idempotency_key,
            amount: request.amount.amount(),
            payer_email: &request.payer_email,
            description: &request.description,
            invoice_duration: self.invoice_duration.as_secs(),
        };

        let response = self
            .client
            .post(format!("{}/v2/invoices", self.base_url))
            .basic_auth(&self.secret_key, Some(""))
            .header("X-IDEMPOTENCY-KEY", &request.idempotency_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "gateway rejected invoice request");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateInvoiceResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if created.invoice_url.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "invoice has no payment link".to_string(),
            ));
        }

        Ok(Invoice {
            reference: created.id,
            redirect_url: created.invoice_url,
            expires_at: created.expiry_date,
        })
    }
}
