//! Purchase and transaction lookup endpoints.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ListingId, TransactionId, UserId};
use domain::{Money, PaymentStatus, Transaction, TransactionStatus};
use purchase::PurchaseReceipt;
use serde::{Deserialize, Serialize};
use store::TransactionStore;

use super::Envelope;
use super::listings::parse_listing_id;
use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub listing_id: String,
}

#[derive(Debug, Serialize)]
pub struct FeesResponse {
    pub item_price: Money,
    pub platform_fee_amount: Money,
    pub total_buyer_paid: Money,
    pub disbursement_fee: Money,
    pub seller_received: Money,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub fees: FeesResponse,
    pub status: TransactionStatus,
    pub payment_status: PaymentStatus,
    pub payment_gateway_ref: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        let fees = FeesResponse {
            item_price: tx.fees.item_price(),
            platform_fee_amount: tx.fees.platform_fee_amount(),
            total_buyer_paid: tx.fees.total_buyer_paid(),
            disbursement_fee: tx.fees.disbursement_fee(),
            seller_received: tx.fees.seller_received(),
        };
        Self {
            id: tx.id,
            listing_id: tx.listing_id,
            buyer_id: tx.buyer_id,
            seller_id: tx.seller_id,
            fees,
            status: tx.status,
            payment_status: tx.payment_status,
            payment_gateway_ref: tx.payment_gateway_ref,
            expires_at: tx.expires_at,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// POST /transactions/purchase: start paying for a listing.
#[tracing::instrument(skip(state, user, payload), fields(buyer_id = %user.id))]
pub async fn purchase(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<PurchaseReceipt>>), ApiError> {
    let Json(req) = payload?;
    let listing_id = parse_listing_id(&req.listing_id)?;

    let receipt = state
        .orchestrator
        .purchase(&user.buyer(), listing_id)
        .await?;

    Ok((StatusCode::CREATED, Json(Envelope::ok(receipt))))
}

/// GET /transactions/{id}: visible to the buyer and the seller only.
#[tracing::instrument(skip(state, user, id), fields(user_id = %user.id))]
pub async fn get(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Envelope<TransactionResponse>>, ApiError> {
    let Path(id) = id?;
    let not_found = || ApiError::NotFound(format!("Transaction {id} not found"));
    let transaction_id = TransactionId::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid transaction id: {e}")))?;

    let transaction = state
        .transactions
        .get_by_id(transaction_id)
        .await?
        .filter(|tx| tx.involves(user.id))
        .ok_or_else(not_found)?;

    Ok(Json(Envelope::ok(transaction.into())))
}
