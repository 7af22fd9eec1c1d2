//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Persistence seams for the Bid and Product aggregates.
//
// The settlement scheduler and the payment event consumer can both try to
// finalize the same product. Neither path holds a lock, so the store exposes
// a versioned compare-and-set (`update_versioned`) and every finalization
// goes through it; a plain read-modify-write on the product row is never
// enough to decide a winner.
//
// | Name            | Description                                      | Key Methods            |
// |-----------------|--------------------------------------------------|------------------------|
// | ProductStore    | Product persistence seam                         | update_versioned       |
// | BidStore        | Bid persistence seam                             | find_by_reservation_id |
// | StorageError    | Errors returned by the stores                    |                        |
//--------------------------------------------------------------------------------------------------

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::types::{Bid, Product};

pub mod memory;

/// Errors that can occur at the storage boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// The entity does not exist.
    #[error("{0} {1} not found")]
    NotFound(&'static str, i64),

    /// The compare-and-set lost: the row moved since it was read.
    #[error("version conflict on product {0}")]
    VersionConflict(i64),

    /// The backing store failed.
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Type alias for Result with StorageError
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence seam for products.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Loads a product by id.
    async fn find_product(&self, product_id: i64) -> StorageResult<Option<Product>>;

    /// Loads every product whose auction has ended but is still open.
    async fn find_expired_open(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<Vec<Product>>;

    /// Writes a product unconditionally and returns it with a bumped version.
    async fn save_product(&self, product: Product) -> StorageResult<Product>;

    /// Writes a product only if the stored row still carries
    /// `expected_version`. Returns `StorageError::VersionConflict` when the
    /// row moved since it was read. Both settlement paths finalize a product
    /// through this single-statement compare-and-set.
    async fn update_versioned(
        &self,
        product: Product,
        expected_version: u64,
    ) -> StorageResult<Product>;
}

/// Persistence seam for bids.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BidStore: Send + Sync {
    /// Inserts a new bid, assigning its id.
    async fn insert_bid(&self, bid: Bid) -> StorageResult<Bid>;

    /// Updates an existing bid.
    async fn save_bid(&self, bid: Bid) -> StorageResult<Bid>;

    /// All bids placed on a product.
    async fn find_by_product(&self, product_id: i64) -> StorageResult<Vec<Bid>>;

    /// All bids placed by a bidder.
    async fn find_by_bidder(&self, bidder_id: i64) -> StorageResult<Vec<Bid>>;

    /// Correlates a payment event back to its bid.
    async fn find_by_reservation_id(&self, reservation_id: &str) -> StorageResult<Option<Bid>>;

    /// Whether the bidder already has a bid on the product.
    async fn bidder_has_bid(&self, bidder_id: i64, product_id: i64) -> StorageResult<bool>;

    /// The highest-amount bid on a product, if any.
    async fn find_top_by_product(&self, product_id: i64) -> StorageResult<Option<Bid>>;
}
