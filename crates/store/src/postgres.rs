use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ListingId, TransactionId, UserId};
use domain::{FeeBreakdown, Listing, ListingStatus, Money, Transaction, TransactionStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ListingPage, ListingQuery, ListingSort, Result, StoreError,
    store::{ListingStore, TransactionStore},
};

const LISTING_COLUMNS: &str = "id, seller_id, game_id, title, description, price, login_method, \
     details, images, status, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, buyer_id, seller_id, listing_id, item_price, \
     platform_fee_amount, disbursement_fee, total_buyer_paid, seller_received, status, \
     payment_status, payment_gateway_ref, expires_at, created_at, updated_at";

/// Name of the partial unique index allowing one Pending transaction per listing.
const ONE_PENDING_PER_LISTING: &str = "one_pending_transaction_per_listing";

/// PostgreSQL-backed listing and transaction store.
///
/// Every status transition is a single conditional `UPDATE` whose `WHERE`
/// clause names the allowed source statuses; `rows_affected` tells whether
/// the transition happened.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_listing(row: PgRow) -> Result<Listing> {
        let status: String = row.try_get("status")?;
        let login_method: String = row.try_get("login_method")?;

        Ok(Listing {
            id: ListingId::from_uuid(row.try_get::<Uuid, _>("id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            game_id: row.try_get("game_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: Money::new(row.try_get::<Decimal, _>("price")?),
            login_method: login_method.parse()?,
            details: row.try_get("details")?,
            images: row.try_get("images")?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transaction(row: PgRow) -> Result<Transaction> {
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;
        let money = |column: &str| -> Result<Money> {
            Ok(Money::new(row.try_get::<Decimal, _>(column)?))
        };

        let fees = FeeBreakdown::from_stored(
            money("item_price")?,
            money("platform_fee_amount")?,
            money("disbursement_fee")?,
            money("total_buyer_paid")?,
            money("seller_received")?,
        )?;

        Ok(Transaction {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            listing_id: ListingId::from_uuid(row.try_get::<Uuid, _>("listing_id")?),
            fees,
            status: status.parse()?,
            payment_status: payment_status.parse()?,
            payment_gateway_ref: row.try_get("payment_gateway_ref")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Reads the current status of a listing after a conditional update
    /// matched no row, to tell "missing" apart from "wrong status".
    async fn listing_transition_error(&self, id: ListingId, action: &'static str) -> StoreError {
        let current: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM listings WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => StoreError::ListingNotFound(id),
            Ok(Some(status)) => match status.parse::<ListingStatus>() {
                Ok(current) => StoreError::ListingTransition {
                    listing_id: id,
                    action,
                    current,
                },
                Err(e) => StoreError::Corrupt(e),
            },
            Err(e) => StoreError::Database(e),
        }
    }

    async fn transaction_transition_error(
        &self,
        id: TransactionId,
        action: &'static str,
    ) -> StoreError {
        let current: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => StoreError::TransactionNotFound(id),
            Ok(Some(status)) => match status.parse::<TransactionStatus>() {
                Ok(current) => StoreError::TransactionTransition {
                    transaction_id: id,
                    action,
                    current,
                },
                Err(e) => StoreError::Corrupt(e),
            },
            Err(e) => StoreError::Database(e),
        }
    }
}

/// Appends the `WHERE` clause for a listing query.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ListingQuery) {
    builder.push(" WHERE 1=1");

    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(game_id) = query.game_id {
        builder.push(" AND game_id = ").push_bind(game_id);
    }
    if let Some(seller_id) = query.seller_id {
        builder.push(" AND seller_id = ").push_bind(seller_id.as_uuid());
    }
    if let Some(min) = query.min_price {
        builder.push(" AND price >= ").push_bind(min.amount());
    }
    if let Some(max) = query.max_price {
        builder.push(" AND price <= ").push_bind(max.amount());
    }
    if let Some(ref term) = query.search {
        builder
            .push(" AND title ILIKE ")
            .push_bind(format!("%{}%", escape_like(term)))
            .push(" ESCAPE '\\'");
    }
}

/// Escapes LIKE wildcards so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn order_clause(sort: ListingSort) -> &'static str {
    match sort {
        ListingSort::Newest => " ORDER BY created_at DESC, id",
        ListingSort::Oldest => " ORDER BY created_at ASC, id",
        ListingSort::PriceAsc => " ORDER BY price ASC, created_at DESC, id",
        ListingSort::PriceDesc => " ORDER BY price DESC, created_at DESC, id",
    }
}

#[async_trait]
impl ListingStore for PostgresStore {
    async fn insert(&self, listing: Listing) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, seller_id, game_id, title, description, price, login_method,
                                  details, images, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(listing.id.as_uuid())
        .bind(listing.seller_id.as_uuid())
        .bind(listing.game_id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price.amount())
        .bind(listing.login_method.as_str())
        .bind(&listing.details)
        .bind(&listing.images)
        .bind(listing.status.as_str())
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateListing(listing.id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: ListingId) -> Result<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_listing).transpose()
    }

    async fn list(&self, query: ListingQuery) -> Result<ListingPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM listings");
        push_filters(&mut count, &query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {LISTING_COLUMNS} FROM listings"
        ));
        push_filters(&mut select, &query);
        select
            .push(order_clause(query.sort))
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(query.offset() as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let listings = rows
            .into_iter()
            .map(Self::row_to_listing)
            .collect::<Result<Vec<_>>>()?;

        Ok(ListingPage {
            listings,
            page: query.page,
            limit: query.limit,
            total: total.max(0) as u64,
        })
    }

    #[tracing::instrument(skip(self), fields(%id))]
    async fn try_reserve_from(&self, id: ListingId, expected: ListingStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET status = 'reserved', updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        let reserved = result.rows_affected() == 1;
        tracing::debug!(reserved, "reservation attempt");
        Ok(reserved)
    }

    #[tracing::instrument(skip(self), fields(%id))]
    async fn mark_sold(&self, id: ListingId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET status = 'sold', updated_at = NOW()
            WHERE id = $1 AND status = 'reserved'
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.listing_transition_error(id, "mark sold").await);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(%id))]
    async fn release(&self, id: ListingId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET status = 'active', updated_at = NOW()
            WHERE id = $1 AND status IN ('reserved', 'sold')
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.listing_transition_error(id, "release").await);
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PostgresStore {
    #[tracing::instrument(skip(self, transaction), fields(transaction_id = %transaction.id, listing_id = %transaction.listing_id))]
    async fn create(&self, transaction: &Transaction) -> Result<()> {
        let fees = &transaction.fees;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, buyer_id, seller_id, listing_id, item_price,
                                      platform_fee_amount, disbursement_fee, total_buyer_paid,
                                      seller_received, status, payment_status,
                                      payment_gateway_ref, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.buyer_id.as_uuid())
        .bind(transaction.seller_id.as_uuid())
        .bind(transaction.listing_id.as_uuid())
        .bind(fees.item_price().amount())
        .bind(fees.platform_fee_amount().amount())
        .bind(fees.disbursement_fee().amount())
        .bind(fees.total_buyer_paid().amount())
        .bind(fees.seller_received().amount())
        .bind(transaction.status.as_str())
        .bind(transaction.payment_status.as_str())
        .bind(&transaction.payment_gateway_ref)
        .bind(transaction.expires_at)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && (db_err.constraint() == Some(ONE_PENDING_PER_LISTING)
                    || db_err.constraint() == Some("transactions_pkey"))
            {
                return StoreError::DuplicateTransaction {
                    listing_id: transaction.listing_id,
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    #[tracing::instrument(skip(self), fields(%id))]
    async fn attach_gateway_ref(
        &self,
        id: TransactionId,
        reference: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET payment_gateway_ref = $2, expires_at = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(reference)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .transaction_transition_error(id, "attach gateway reference to")
                .await);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(%id))]
    async fn mark_failed(&self, id: TransactionId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'failed', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transaction_transition_error(id, "fail").await);
        }
        Ok(())
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE status = 'pending' AND payment_status = 'pending' AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    #[tracing::instrument(skip(self), fields(%id))]
    async fn mark_expired(&self, id: TransactionId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'expired', updated_at = $2
            WHERE id = $1
              AND status = 'pending'
              AND payment_status = 'pending'
              AND expires_at < $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
