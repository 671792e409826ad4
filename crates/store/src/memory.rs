use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ListingId, TransactionId};
use domain::{Listing, ListingStatus, Transaction, TransactionStatus};
use tokio::sync::RwLock;

use crate::{
    ListingPage, ListingQuery, ListingSort, Result, StoreError,
    store::{ListingStore, TransactionStore},
};

/// Switches that make selected writes fail, for exercising compensation paths.
#[derive(Default)]
struct FailureSwitches {
    create_transaction: AtomicBool,
    mark_sold: AtomicBool,
    release: AtomicBool,
}

/// In-memory listing and transaction store.
///
/// Provides the same contracts as the PostgreSQL implementation. Conditional
/// transitions hold the table's write lock across the status check and the
/// update, so concurrent reservers are serialized exactly like a conditional
/// `UPDATE ... WHERE status = $expected`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    listings: Arc<RwLock<HashMap<ListingId, Listing>>>,
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
    failures: Arc<FailureSwitches>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of transactions recorded for a listing.
    pub async fn transaction_count_for(&self, listing_id: ListingId) -> usize {
        self.transactions
            .read()
            .await
            .values()
            .filter(|t| t.listing_id == listing_id)
            .count()
    }

    /// Returns every transaction recorded for a listing.
    pub async fn transactions_for(&self, listing_id: ListingId) -> Vec<Transaction> {
        self.transactions
            .read()
            .await
            .values()
            .filter(|t| t.listing_id == listing_id)
            .cloned()
            .collect()
    }

    /// Makes `TransactionStore::create` fail with `Unavailable`.
    pub fn set_fail_on_create_transaction(&self, fail: bool) {
        self.failures.create_transaction.store(fail, Ordering::SeqCst);
    }

    /// Makes `ListingStore::mark_sold` fail with `Unavailable`.
    pub fn set_fail_on_mark_sold(&self, fail: bool) {
        self.failures.mark_sold.store(fail, Ordering::SeqCst);
    }

    /// Makes `ListingStore::release` fail with `Unavailable`.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.failures.release.store(fail, Ordering::SeqCst);
    }

    /// Clears all listings and transactions.
    pub async fn clear(&self) {
        self.listings.write().await.clear();
        self.transactions.write().await.clear();
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ListingStore for InMemoryStore {
    async fn insert(&self, listing: Listing) -> Result<()> {
        let mut listings = self.listings.write().await;
        if listings.contains_key(&listing.id) {
            return Err(StoreError::DuplicateListing(listing.id));
        }
        listings.insert(listing.id, listing);
        Ok(())
    }

    async fn get_by_id(&self, id: ListingId) -> Result<Option<Listing>> {
        Ok(self.listings.read().await.get(&id).cloned())
    }

    async fn list(&self, query: ListingQuery) -> Result<ListingPage> {
        let listings = self.listings.read().await;
        let mut matching: Vec<_> = listings
            .values()
            .filter(|l| query.matches(l))
            .cloned()
            .collect();

        match query.sort {
            ListingSort::Newest => matching.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ListingSort::Oldest => matching.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            ListingSort::PriceAsc => matching.sort_by(|a, b| {
                a.price
                    .cmp(&b.price)
                    .then(b.created_at.cmp(&a.created_at))
            }),
            ListingSort::PriceDesc => matching.sort_by(|a, b| {
                b.price
                    .cmp(&a.price)
                    .then(b.created_at.cmp(&a.created_at))
            }),
        }

        let total = matching.len() as u64;
        let listings = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();

        Ok(ListingPage {
            listings,
            page: query.page,
            limit: query.limit,
            total,
        })
    }

    async fn try_reserve_from(&self, id: ListingId, expected: ListingStatus) -> Result<bool> {
        let mut listings = self.listings.write().await;
        match listings.get_mut(&id) {
            Some(listing) if listing.status == expected => {
                listing.status = ListingStatus::Reserved;
                listing.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_sold(&self, id: ListingId) -> Result<()> {
        Self::injected(&self.failures.mark_sold, "mark_sold")?;

        let mut listings = self.listings.write().await;
        let listing = listings
            .get_mut(&id)
            .ok_or(StoreError::ListingNotFound(id))?;

        if !listing.status.can_mark_sold() {
            return Err(StoreError::ListingTransition {
                listing_id: id,
                action: "mark sold",
                current: listing.status,
            });
        }
        listing.status = ListingStatus::Sold;
        listing.updated_at = Utc::now();
        Ok(())
    }

    async fn release(&self, id: ListingId) -> Result<()> {
        Self::injected(&self.failures.release, "release")?;

        let mut listings = self.listings.write().await;
        let listing = listings
            .get_mut(&id)
            .ok_or(StoreError::ListingNotFound(id))?;

        if !listing.status.can_release() {
            return Err(StoreError::ListingTransition {
                listing_id: id,
                action: "release",
                current: listing.status,
            });
        }
        listing.status = ListingStatus::Active;
        listing.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn create(&self, transaction: &Transaction) -> Result<()> {
        Self::injected(&self.failures.create_transaction, "create")?;

        let mut transactions = self.transactions.write().await;

        // Unique index simulation: one Pending transaction per listing
        let pending_exists = transactions.values().any(|t| {
            t.listing_id == transaction.listing_id && t.status == TransactionStatus::Pending
        });
        if pending_exists || transactions.contains_key(&transaction.id) {
            return Err(StoreError::DuplicateTransaction {
                listing_id: transaction.listing_id,
            });
        }

        transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn attach_gateway_ref(
        &self,
        id: TransactionId,
        reference: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .ok_or(StoreError::TransactionNotFound(id))?;

        if transaction.status != TransactionStatus::Pending {
            return Err(StoreError::TransactionTransition {
                transaction_id: id,
                action: "attach gateway reference to",
                current: transaction.status,
            });
        }
        transaction.payment_gateway_ref = Some(reference.to_string());
        transaction.expires_at = Some(expires_at);
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .ok_or(StoreError::TransactionNotFound(id))?;

        if transaction.status != TransactionStatus::Pending {
            return Err(StoreError::TransactionTransition {
                transaction_id: id,
                action: "fail",
                current: transaction.status,
            });
        }
        transaction.status = TransactionStatus::Failed;
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut overdue: Vec<_> = transactions
            .values()
            .filter(|t| t.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|t| t.expires_at);
        overdue.truncate(limit);
        Ok(overdue)
    }

    async fn mark_expired(&self, id: TransactionId, now: DateTime<Utc>) -> Result<bool> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&id) {
            Some(transaction) if transaction.is_overdue(now) => {
                transaction.status = TransactionStatus::Expired;
                transaction.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
