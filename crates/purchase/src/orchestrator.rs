//! Purchase orchestrator: reserve, price, persist, invoice, compensate.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::{ListingId, TransactionId, UserId};
use domain::{FeePolicy, Listing, Transaction};
use serde::Serialize;
use store::{ListingStore, ListingStoreExt, TransactionStore};

use crate::error::{GatewayError, PurchaseError, Result};
use crate::gateway::{Invoice, InvoiceRequest, PaymentGateway};
use crate::workflow;

/// An authenticated buyer, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buyer {
    pub id: UserId,
    /// Passed to the gateway as the payer.
    pub email: String,
}

/// Tunables for the purchase workflow.
#[derive(Debug, Clone)]
pub struct PurchaseConfig {
    pub fee_policy: FeePolicy,
    /// Upper bound on the gateway call, and so on how long a listing can
    /// stay Reserved.
    pub gateway_timeout: Duration,
    /// Payment deadline used when the gateway does not report one.
    pub payment_window: chrono::Duration,
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            fee_policy: FeePolicy::default(),
            gateway_timeout: Duration::from_secs(10),
            payment_window: chrono::Duration::hours(1),
        }
    }
}

/// Result of a successfully initiated purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub transaction_id: TransactionId,
    pub payment_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Drives the purchase workflow against the listing store, the transaction
/// store and the payment gateway.
///
/// Collaborators are injected at construction. Cloning is cheap when they are
/// `Arc`s or pooled handles.
#[derive(Clone)]
pub struct PurchaseOrchestrator<L, T, G> {
    listings: L,
    transactions: T,
    gateway: G,
    config: PurchaseConfig,
}

impl<L, T, G> PurchaseOrchestrator<L, T, G>
where
    L: ListingStore + Clone + 'static,
    T: TransactionStore + Clone + 'static,
    G: PaymentGateway + Clone + 'static,
{
    /// Creates a new purchase orchestrator.
    pub fn new(listings: L, transactions: T, gateway: G, config: PurchaseConfig) -> Self {
        Self {
            listings,
            transactions,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &PurchaseConfig {
        &self.config
    }

    /// Purchases `listing_id` for `buyer`.
    ///
    /// Only one of any number of concurrent calls for the same listing gets
    /// past the reservation; the rest fail with `ListingUnavailable` without
    /// writing anything. The reservation and every later step run on their
    /// own task, so dropping this future does not interrupt them: a reserved
    /// attempt always ends either Sold with an invoice reference, or
    /// compensated.
    #[tracing::instrument(skip(self, buyer), fields(buyer_id = %buyer.id, %listing_id))]
    pub async fn purchase(&self, buyer: &Buyer, listing_id: ListingId) -> Result<PurchaseReceipt> {
        metrics::counter!("purchase_attempts_total").increment(1);
        let started = Instant::now();

        let result = self.run(buyer, listing_id).await;

        metrics::histogram!("purchase_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                metrics::counter!("purchase_succeeded_total").increment(1);
                tracing::info!(
                    transaction_id = %receipt.transaction_id,
                    expires_at = %receipt.expires_at,
                    "purchase initiated"
                );
            }
            Err(e) => {
                metrics::counter!("purchase_rejected_total", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, "purchase failed");
            }
        }
        result
    }

    async fn run(&self, buyer: &Buyer, listing_id: ListingId) -> Result<PurchaseReceipt> {
        // 1. Validate
        tracing::debug!(step = workflow::STEP_VALIDATE, "purchase step started");
        let listing = self
            .listings
            .get_by_id(listing_id)
            .await?
            .ok_or(PurchaseError::ListingUnavailable(listing_id))?;

        if listing.is_owned_by(buyer.id) {
            return Err(PurchaseError::SelfPurchaseForbidden);
        }

        // 2-5 run detached from the caller, starting with the reservation
        let this = self.clone();
        let owned_buyer = buyer.clone();
        let task = tokio::spawn(async move { this.supervise(owned_buyer, listing).await });

        task.await.unwrap_or_else(|join_error| {
            Err(PurchaseError::Internal(format!(
                "purchase supervisor failed: {join_error}"
            )))
        })
    }

    /// Runs the workflow on its own task and compensates from the recorded
    /// progress if that task panics.
    async fn supervise(self, buyer: Buyer, listing: Listing) -> Result<PurchaseReceipt> {
        let listing_id = listing.id;
        let progress = ProgressSlot::default();

        let this = self.clone();
        let task_progress = progress.clone();
        let task = tokio::spawn(async move {
            this.reserve_and_complete(&buyer, &listing, &task_progress).await
        });

        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                // The task died before it could compensate
                let error = PurchaseError::Internal(format!("purchase task failed: {join_error}"));
                let Progress {
                    reserved,
                    transaction_id,
                } = progress.get();
                if reserved {
                    self.compensate(listing_id, transaction_id, &error).await;
                }
                Err(error)
            }
        }
    }

    /// Reserves the listing, then runs every later step; compensates exactly
    /// once on any failure after the reservation.
    async fn reserve_and_complete(
        &self,
        buyer: &Buyer,
        listing: &Listing,
        progress: &ProgressSlot,
    ) -> Result<PurchaseReceipt> {
        // 2. Reserve
        tracing::debug!(step = workflow::STEP_RESERVE, "purchase step started");
        if !self.listings.try_reserve(listing.id).await? {
            return Err(PurchaseError::ListingUnavailable(listing.id));
        }
        progress.update(|p| p.reserved = true);

        match self.initiate_payment(buyer, listing, progress).await {
            Ok(receipt) => Ok(receipt),
            Err(error) => {
                self.compensate(listing.id, progress.get().transaction_id, &error).await;
                Err(error)
            }
        }
    }

    async fn initiate_payment(
        &self,
        buyer: &Buyer,
        listing: &Listing,
        progress: &ProgressSlot,
    ) -> Result<PurchaseReceipt> {
        // 3. Price & fees, 4. Persist Pending transaction
        tracing::debug!(step = workflow::STEP_PERSIST_TRANSACTION, "purchase step started");
        let fees = self.config.fee_policy.compute_fees(listing.price)?;
        let now = Utc::now();
        let transaction = Transaction::pending(buyer.id, listing, fees, now);
        self.transactions.create(&transaction).await?;
        progress.update(|p| p.transaction_id = Some(transaction.id));

        // 5. Invoke gateway
        tracing::debug!(step = workflow::STEP_CREATE_INVOICE, "purchase step started");
        let request = InvoiceRequest {
            idempotency_key: transaction.id.to_string(),
            amount: fees.total_buyer_paid(),
            payer_email: buyer.email.clone(),
            description: format!("Purchase of {}", listing.title),
        };
        let invoice = self.request_invoice(request).await.map_err(|source| {
            PurchaseError::PaymentInitiationFailed {
                transaction_id: transaction.id,
                source,
            }
        })?;

        // Success path
        tracing::debug!(step = workflow::STEP_FINALIZE, "purchase step started");
        let expires_at = invoice
            .expires_at
            .unwrap_or(now + self.config.payment_window);
        self.listings.mark_sold(listing.id).await?;
        self.transactions
            .attach_gateway_ref(transaction.id, &invoice.reference, expires_at)
            .await?;

        Ok(PurchaseReceipt {
            transaction_id: transaction.id,
            payment_url: invoice.redirect_url,
            expires_at,
        })
    }

    async fn request_invoice(
        &self,
        request: InvoiceRequest,
    ) -> std::result::Result<Invoice, GatewayError> {
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.config.gateway_timeout, self.gateway.create_invoice(request))
                .await;
        metrics::histogram!("gateway_invoice_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.gateway_timeout)),
        }
    }

    /// Releases the listing and fails the transaction.
    ///
    /// Failures here are not returned to the caller: they leave a listing
    /// Reserved or Sold without a live transaction, which an operator must
    /// reconcile, so they are logged as consistency alerts.
    async fn compensate(
        &self,
        listing_id: ListingId,
        transaction_id: Option<TransactionId>,
        cause: &PurchaseError,
    ) {
        metrics::counter!("purchase_compensated_total").increment(1);
        tracing::warn!(
            step = workflow::STEP_COMPENSATE,
            %listing_id,
            transaction_id = ?transaction_id,
            cause = %cause,
            "compensating failed purchase"
        );

        if let Err(e) = self.listings.release(listing_id).await {
            metrics::counter!("purchase_compensation_failed_total").increment(1);
            tracing::error!(
                consistency_alert = true,
                %listing_id,
                transaction_id = ?transaction_id,
                error = %e,
                "failed to release listing during compensation"
            );
        }

        if let Some(transaction_id) = transaction_id
            && let Err(e) = self.transactions.mark_failed(transaction_id).await
        {
            metrics::counter!("purchase_compensation_failed_total").increment(1);
            tracing::error!(
                consistency_alert = true,
                %listing_id,
                %transaction_id,
                error = %e,
                "failed to mark transaction failed during compensation"
            );
        }
    }
}

/// What a purchase attempt has written so far.
#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    reserved: bool,
    transaction_id: Option<TransactionId>,
}

/// Progress shared with the supervising task, which reads it after a panic.
#[derive(Debug, Default, Clone)]
struct ProgressSlot(Arc<Mutex<Progress>>);

impl ProgressSlot {
    fn update(&self, apply: impl FnOnce(&mut Progress)) {
        apply(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn get(&self) -> Progress {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryPaymentGateway;
    use async_trait::async_trait;
    use domain::{ListingDraft, ListingStatus, LoginMethod, Money, TransactionStatus};
    use rust_decimal::Decimal;
    use store::{InMemoryStore, ListingPage, ListingQuery};

    type TestOrchestrator =
        PurchaseOrchestrator<InMemoryStore, InMemoryStore, InMemoryPaymentGateway>;

    fn listing_priced(price: Money) -> Listing {
        Listing::new(
            UserId::new(),
            ListingDraft {
                game_id: 1,
                title: "Mythic Glory account".to_string(),
                description: None,
                price,
                login_method: LoginMethod::Moonton,
                details: serde_json::json!({}),
                images: vec![],
            },
            Utc::now(),
        )
    }

    async fn setup() -> (TestOrchestrator, InMemoryStore, InMemoryPaymentGateway, Listing) {
        let store = InMemoryStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let listing = listing_priced(Money::from_units(125000));
        store.insert(listing.clone()).await.unwrap();

        let orchestrator = PurchaseOrchestrator::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            PurchaseConfig::default(),
        );
        (orchestrator, store, gateway, listing)
    }

    fn buyer() -> Buyer {
        Buyer {
            id: UserId::new(),
            email: "buyer@example.com".to_string(),
        }
    }

    /// Listing store whose reservation result comes back only after `delay`.
    #[derive(Clone)]
    struct SlowReserveStore {
        inner: InMemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl ListingStore for SlowReserveStore {
        async fn insert(&self, listing: Listing) -> store::Result<()> {
            self.inner.insert(listing).await
        }

        async fn get_by_id(&self, id: ListingId) -> store::Result<Option<Listing>> {
            ListingStore::get_by_id(&self.inner, id).await
        }

        async fn list(&self, query: ListingQuery) -> store::Result<ListingPage> {
            self.inner.list(query).await
        }

        async fn try_reserve_from(
            &self,
            id: ListingId,
            expected: ListingStatus,
        ) -> store::Result<bool> {
            let reserved = self.inner.try_reserve_from(id, expected).await?;
            tokio::time::sleep(self.delay).await;
            Ok(reserved)
        }

        async fn mark_sold(&self, id: ListingId) -> store::Result<()> {
            self.inner.mark_sold(id).await
        }

        async fn release(&self, id: ListingId) -> store::Result<()> {
            self.inner.release(id).await
        }
    }

    /// Gateway whose client code panics mid-request.
    #[derive(Clone)]
    struct PanickingGateway;

    #[async_trait]
    impl PaymentGateway for PanickingGateway {
        async fn create_invoice(
            &self,
            _request: InvoiceRequest,
        ) -> std::result::Result<Invoice, GatewayError> {
            panic!("invoice client bug");
        }
    }

    async fn listing_status(store: &InMemoryStore, id: ListingId) -> ListingStatus {
        ListingStore::get_by_id(store, id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_successful_purchase() {
        let (orchestrator, store, gateway, listing) = setup().await;
        let buyer = buyer();

        let receipt = orchestrator.purchase(&buyer, listing.id).await.unwrap();

        assert!(receipt.payment_url.starts_with("https://checkout.xendit.co/web/"));
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Sold);

        let transaction = TransactionStore::get_by_id(&store, receipt.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transaction.status, TransactionStatus::Pending);
        assert_eq!(transaction.buyer_id, buyer.id);
        assert_eq!(transaction.seller_id, listing.seller_id);
        assert_eq!(transaction.expires_at, Some(receipt.expires_at));
        assert!(transaction.payment_gateway_ref.is_some());

        let request = gateway
            .request_for(&receipt.transaction_id.to_string())
            .await
            .unwrap();
        assert_eq!(request.amount, Money::from_units(131250));
        assert_eq!(request.description, "Purchase of Mythic Glory account");
        assert_eq!(request.payer_email, "buyer@example.com");
    }

    #[tokio::test]
    async fn test_self_purchase_is_rejected_without_mutation() {
        let (orchestrator, store, _, listing) = setup().await;
        let seller = Buyer {
            id: listing.seller_id,
            email: "seller@example.com".to_string(),
        };

        let result = orchestrator.purchase(&seller, listing.id).await;

        assert!(matches!(result, Err(PurchaseError::SelfPurchaseForbidden)));
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Active);
        assert_eq!(store.transaction_count_for(listing.id).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_listing_is_unavailable() {
        let (orchestrator, _, _, _) = setup().await;
        let missing = ListingId::new();

        let result = orchestrator.purchase(&buyer(), missing).await;
        assert!(matches!(result, Err(PurchaseError::ListingUnavailable(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_gateway_failure_compensates() {
        let (orchestrator, store, gateway, listing) = setup().await;
        gateway.set_fail_on_create(true).await;

        let result = orchestrator.purchase(&buyer(), listing.id).await;

        let Err(PurchaseError::PaymentInitiationFailed { transaction_id, .. }) = &result else {
            panic!("expected PaymentInitiationFailed, got {result:?}");
        };
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Active);
        let transaction = TransactionStore::get_by_id(&store, *transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transaction.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_store_failure_after_reservation_releases_listing() {
        let (orchestrator, store, _, listing) = setup().await;
        store.set_fail_on_create_transaction(true);

        let result = orchestrator.purchase(&buyer(), listing.id).await;

        assert!(matches!(result, Err(PurchaseError::StoreUnavailable(_))));
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Active);
        assert_eq!(store.transaction_count_for(listing.id).await, 0);
    }

    #[tokio::test]
    async fn test_mark_sold_failure_fails_transaction() {
        let (orchestrator, store, _, listing) = setup().await;
        store.set_fail_on_mark_sold(true);

        let result = orchestrator.purchase(&buyer(), listing.id).await;

        assert!(matches!(result, Err(PurchaseError::StoreUnavailable(_))));
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Active);
        let transactions = store.transactions_for(listing.id).await;
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_release_failure_still_fails_transaction() {
        let (orchestrator, store, gateway, listing) = setup().await;
        gateway.set_fail_on_create(true).await;
        store.set_fail_on_release(true);

        let result = orchestrator.purchase(&buyer(), listing.id).await;

        assert!(matches!(
            result,
            Err(PurchaseError::PaymentInitiationFailed { .. })
        ));
        // Stuck reservation is left for an operator to reconcile
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Reserved);
        let transactions = store.transactions_for(listing.id).await;
        assert_eq!(transactions[0].status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_listing_can_be_bought_again_after_compensation() {
        let (orchestrator, store, gateway, listing) = setup().await;
        gateway.set_fail_on_create(true).await;
        assert!(orchestrator.purchase(&buyer(), listing.id).await.is_err());

        gateway.set_fail_on_create(false).await;
        orchestrator.purchase(&buyer(), listing.id).await.unwrap();

        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Sold);
        assert_eq!(store.transaction_count_for(listing.id).await, 2);
    }

    #[tokio::test]
    async fn test_dropped_caller_during_reservation_still_completes() {
        let (_, store, gateway, listing) = setup().await;
        let slow = SlowReserveStore {
            inner: store.clone(),
            delay: Duration::from_millis(100),
        };
        let orchestrator =
            PurchaseOrchestrator::new(slow, store.clone(), gateway, PurchaseConfig::default());

        let attempt = tokio::time::timeout(
            Duration::from_millis(20),
            orchestrator.purchase(&buyer(), listing.id),
        )
        .await;
        assert!(attempt.is_err(), "caller should give up mid-reservation");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Sold);
        let transactions = store.transactions_for(listing.id).await;
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].status, TransactionStatus::Pending);
        assert!(transactions[0].payment_gateway_ref.is_some());
    }

    #[tokio::test]
    async fn test_panic_after_persist_fails_transaction() {
        let (_, store, _, listing) = setup().await;
        let orchestrator = PurchaseOrchestrator::new(
            store.clone(),
            store.clone(),
            PanickingGateway,
            PurchaseConfig::default(),
        );

        let result = orchestrator.purchase(&buyer(), listing.id).await;

        assert!(matches!(result, Err(PurchaseError::Internal(_))));
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Active);
        let transactions = store.transactions_for(listing.id).await;
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_price_too_large_for_fees_is_compensated() {
        let (orchestrator, store, _, _) = setup().await;
        let listing = listing_priced(Money::new(Decimal::MAX));
        store.insert(listing.clone()).await.unwrap();

        let result = orchestrator.purchase(&buyer(), listing.id).await;

        assert!(matches!(result, Err(PurchaseError::Domain(_))));
        assert_eq!(listing_status(&store, listing.id).await, ListingStatus::Active);
        assert_eq!(store.transaction_count_for(listing.id).await, 0);
    }
}
