use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ListingId, TransactionId};
use domain::{Listing, ListingStatus, Transaction};

use crate::{ListingPage, ListingQuery, Result};

/// Persistent table of listings.
///
/// Status transitions are conditional writes gated on the current status.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Inserts a new listing.
    async fn insert(&self, listing: Listing) -> Result<()>;

    /// Retrieves a listing by id.
    async fn get_by_id(&self, id: ListingId) -> Result<Option<Listing>>;

    /// Retrieves one page of listings matching a query.
    async fn list(&self, query: ListingQuery) -> Result<ListingPage>;

    /// Atomically moves the listing from `expected` to Reserved.
    ///
    /// Returns `false` when the listing does not exist or its status is not
    /// `expected`; only one of any number of concurrent callers for the same
    /// listing can observe `true`. Never errors for the "already taken" case.
    async fn try_reserve_from(&self, id: ListingId, expected: ListingStatus) -> Result<bool>;

    /// Moves a Reserved listing to Sold.
    async fn mark_sold(&self, id: ListingId) -> Result<()>;

    /// Moves a Reserved or Sold listing back to Active.
    async fn release(&self, id: ListingId) -> Result<()>;
}

/// Extension trait providing convenience methods for listing stores.
#[async_trait]
pub trait ListingStoreExt: ListingStore {
    /// Reserves an Active listing. See [`ListingStore::try_reserve_from`].
    async fn try_reserve(&self, id: ListingId) -> Result<bool> {
        self.try_reserve_from(id, ListingStatus::Active).await
    }
}

// Blanket implementation for all ListingStore implementations
impl<T: ListingStore + ?Sized> ListingStoreExt for T {}

/// Persistent table of purchase transactions.
///
/// Every write is durable before the call returns.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a new transaction.
    ///
    /// Fails with `DuplicateTransaction` if a Pending transaction already
    /// references the same listing.
    async fn create(&self, transaction: &Transaction) -> Result<()>;

    /// Retrieves a transaction by id.
    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Records the gateway invoice reference and payment deadline on a
    /// Pending transaction.
    async fn attach_gateway_ref(
        &self,
        id: TransactionId,
        reference: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Moves a Pending transaction to Failed.
    async fn mark_failed(&self, id: TransactionId) -> Result<()>;

    /// Returns up to `limit` unpaid Pending transactions whose deadline is
    /// before `now`, oldest deadline first.
    async fn find_overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>>;

    /// Conditionally moves an overdue transaction to Expired.
    ///
    /// Returns `false` if the transaction was paid, finalized, or is not yet
    /// overdue by the time the write runs.
    async fn mark_expired(&self, id: TransactionId, now: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
impl<T: ListingStore + ?Sized> ListingStore for Arc<T> {
    async fn insert(&self, listing: Listing) -> Result<()> {
        (**self).insert(listing).await
    }

    async fn get_by_id(&self, id: ListingId) -> Result<Option<Listing>> {
        (**self).get_by_id(id).await
    }

    async fn list(&self, query: ListingQuery) -> Result<ListingPage> {
        (**self).list(query).await
    }

    async fn try_reserve_from(&self, id: ListingId, expected: ListingStatus) -> Result<bool> {
        (**self).try_reserve_from(id, expected).await
    }

    async fn mark_sold(&self, id: ListingId) -> Result<()> {
        (**self).mark_sold(id).await
    }

    async fn release(&self, id: ListingId) -> Result<()> {
        (**self).release(id).await
    }
}

#[async_trait]
impl<T: TransactionStore + ?Sized> TransactionStore for Arc<T> {
    async fn create(&self, transaction: &Transaction) -> Result<()> {
        (**self).create(transaction).await
    }

    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>> {
        (**self).get_by_id(id).await
    }

    async fn attach_gateway_ref(
        &self,
        id: TransactionId,
        reference: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        (**self).attach_gateway_ref(id, reference, expires_at).await
    }

    async fn mark_failed(&self, id: TransactionId) -> Result<()> {
        (**self).mark_failed(id).await
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>> {
        (**self).find_overdue(now, limit).await
    }

    async fn mark_expired(&self, id: TransactionId, now: DateTime<Utc>) -> Result<bool> {
        (**self).mark_expired(id, now).await
    }
}
