//! Persistence for listings and purchase transactions.
//!
//! Two implementations share the same contracts:
//! - [`InMemoryStore`] for tests and single-process development
//! - [`PostgresStore`] backed by sqlx
//!
//! The reservation primitive is a single conditional write in both, never a
//! read followed by a write.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{DEFAULT_PAGE_SIZE, ListingPage, ListingQuery, ListingSort, MAX_PAGE_SIZE};
pub use store::{ListingStore, ListingStoreExt, TransactionStore};
