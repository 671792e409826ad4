//! Expiry sweeper: expires unpaid transactions and releases their listings.

use std::time::Duration;

use chrono::{DateTime, Utc};
use store::{ListingStore, StoreError, TransactionStore};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::Result;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Transactions moved from Pending to Expired.
    pub expired: usize,
    /// Listings returned to Active.
    pub released: usize,
}

/// Periodically reaps Pending transactions whose payment window has passed.
///
/// Each transaction is expired with a conditional write, so a payment that
/// lands between the scan and the write wins and the listing stays sold.
pub struct ExpirySweeper<L, T> {
    listings: L,
    transactions: T,
    batch_size: usize,
}

impl<L, T> ExpirySweeper<L, T>
where
    L: ListingStore,
    T: TransactionStore,
{
    /// Creates a sweeper expiring at most `batch_size` transactions per sweep.
    pub fn new(listings: L, transactions: T, batch_size: usize) -> Self {
        Self {
            listings,
            transactions,
            batch_size: batch_size.max(1),
        }
    }

    /// Expires every overdue transaction in one batch.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let overdue = self.transactions.find_overdue(now, self.batch_size).await?;
        let mut report = SweepReport::default();

        for transaction in overdue {
            if !self.transactions.mark_expired(transaction.id, now).await? {
                continue;
            }
            report.expired += 1;

            match self.listings.release(transaction.listing_id).await {
                Ok(()) => report.released += 1,
                Err(StoreError::ListingTransition { current, .. }) => {
                    tracing::debug!(
                        transaction_id = %transaction.id,
                        listing_id = %transaction.listing_id,
                        %current,
                        "listing not held by expired transaction"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        consistency_alert = true,
                        transaction_id = %transaction.id,
                        listing_id = %transaction.listing_id,
                        error = %e,
                        "failed to release listing of expired transaction"
                    );
                }
            }
        }

        metrics::counter!("expiry_sweep_expired_total").increment(report.expired as u64);
        metrics::counter!("expiry_sweep_released_total").increment(report.released as u64);
        Ok(report)
    }

    /// Sweeps every `interval` until `shutdown` flips to true or its sender
    /// is dropped.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(?interval, batch_size = self.batch_size, "expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(report) if report.expired > 0 => {
                            tracing::info!(
                                expired = report.expired,
                                released = report.released,
                                "expired overdue transactions"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    }
}
