//! In-memory store backing both persistence seams.
//!
//! The real deployment keeps bids and products in a relational database
//! owned by another service; this implementation carries the same contract
//! (including the versioned compare-and-set) for local runs and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::types::{Bid, Product};
use crate::storage::{BidStore, ProductStore, StorageError, StorageResult};

#[derive(Default)]
struct Tables {
    products: HashMap<i64, Product>,
    bids: HashMap<i64, Bid>,
    next_bid_id: i64,
}

/// Shared in-memory store for products and bids.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a product, assigning version 0. Intended for wiring and tests.
    pub async fn seed_product(&self, product: Product) {
        let mut tables = self.tables.write().await;
        tables.products.insert(product.id, product);
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn find_product(&self, product_id: i64) -> StorageResult<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.get(&product_id).cloned())
    }

    async fn find_expired_open(&self, now: DateTime<Utc>) -> StorageResult<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .filter(|p| !p.frozen && p.is_expired(now))
            .cloned()
            .collect())
    }

    async fn save_product(&self, mut product: Product) -> StorageResult<Product> {
        let mut tables = self.tables.write().await;
        product.version += 1;
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_versioned(
        &self,
        mut product: Product,
        expected_version: u64,
    ) -> StorageResult<Product> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .products
            .get(&product.id)
            .ok_or(StorageError::NotFound("product", product.id))?;

        if stored.version != expected_version {
            return Err(StorageError::VersionConflict(product.id));
        }

        product.version = expected_version + 1;
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }
}

#[async_trait]
impl BidStore for MemoryStore {
    async fn insert_bid(&self, mut bid: Bid) -> StorageResult<Bid> {
        let mut tables = self.tables.write().await;
        tables.next_bid_id += 1;
        bid.id = tables.next_bid_id;
        tables.bids.insert(bid.id, bid.clone());
        Ok(bid)
    }

    async fn save_bid(&self, bid: Bid) -> StorageResult<Bid> {
        let mut tables = self.tables.write().await;
        if !tables.bids.contains_key(&bid.id) {
            return Err(StorageError::NotFound("bid", bid.id));
        }
        tables.bids.insert(bid.id, bid.clone());
        Ok(bid)
    }

    async fn find_by_product(&self, product_id: i64) -> StorageResult<Vec<Bid>> {
        let tables = self.tables.read().await;
        let mut bids: Vec<Bid> = tables
            .bids
            .values()
            .filter(|b| b.product_id == product_id)
            .cloned()
            .collect();
        bids.sort_by_key(|b| b.id);
        Ok(bids)
    }

    async fn find_by_bidder(&self, bidder_id: i64) -> StorageResult<Vec<Bid>> {
        let tables = self.tables.read().await;
        let mut bids: Vec<Bid> = tables
            .bids
            .values()
            .filter(|b| b.bidder_id == bidder_id)
            .cloned()
            .collect();
        bids.sort_by_key(|b| b.id);
        Ok(bids)
    }

    async fn find_by_reservation_id(&self, reservation_id: &str) -> StorageResult<Option<Bid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bids
            .values()
            .find(|b| b.reservation_id.as_deref() == Some(reservation_id))
            .cloned())
    }

    async fn bidder_has_bid(&self, bidder_id: i64, product_id: i64) -> StorageResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .bids
            .values()
            .any(|b| b.bidder_id == bidder_id && b.product_id == product_id))
    }

    async fn find_top_by_product(&self, product_id: i64) -> StorageResult<Option<Bid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bids
            .values()
            .filter(|b| b.product_id == product_id)
            .max_by_key(|b| b.amount)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::BidStatus;
    use chrono::Duration;

    fn product(id: i64) -> Product {
        Product {
            id,
            name: format!("item-{}", id),
            description: String::new(),
            category: "misc".to_string(),
            min_bid: 1,
            max_bid: 1_000,
            current_bid: 0,
            frozen: false,
            sold: false,
            end_time: Utc::now() - Duration::minutes(1),
            seller_id: 1,
            buyer_id: None,
            version: 0,
        }
    }

    fn bid(product_id: i64, bidder_id: i64, amount: i64) -> Bid {
        Bid {
            id: 0,
            amount,
            bid_time: Utc::now(),
            product_id,
            bidder_id,
            email: format!("bidder{}@example.com", bidder_id),
            reservation_id: Some(format!("res-{}-{}", product_id, bidder_id)),
            status: BidStatus::Pending,
        }
    }

    #[tokio::test]
    async fn should_apply_versioned_update_when_version_matches() {
        let store = MemoryStore::new();
        store.seed_product(product(1)).await;

        let mut loaded = store.find_product(1).await.unwrap().unwrap();
        loaded.mark_sold(9);
        let saved = store.update_versioned(loaded, 0).await.unwrap();

        assert_eq!(saved.version, 1);
        assert!(store.find_product(1).await.unwrap().unwrap().sold);
    }

    #[tokio::test]
    async fn should_reject_versioned_update_on_stale_version() {
        let store = MemoryStore::new();
        store.seed_product(product(1)).await;

        // First writer wins.
        let mut first = store.find_product(1).await.unwrap().unwrap();
        first.mark_sold(9);
        store.update_versioned(first, 0).await.unwrap();

        // Second writer read version 0 too and must lose.
        let mut second = store.find_product(1).await.unwrap().unwrap();
        second.version = 0;
        second.buyer_id = Some(11);
        let err = store.update_versioned(second, 0).await.unwrap_err();

        assert_eq!(err, StorageError::VersionConflict(1));
        assert_eq!(
            store.find_product(1).await.unwrap().unwrap().buyer_id,
            Some(9)
        );
    }

    #[tokio::test]
    async fn should_list_only_expired_open_products() {
        let store = MemoryStore::new();
        let mut open = product(1);
        open.end_time = Utc::now() + Duration::minutes(5);
        let expired = product(2);
        let mut closed = product(3);
        closed.frozen = true;
        store.seed_product(open).await;
        store.seed_product(expired).await;
        store.seed_product(closed).await;

        let found = store.find_expired_open(Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }

    #[tokio::test]
    async fn should_correlate_bid_by_reservation_id() {
        let store = MemoryStore::new();
        let saved = store.insert_bid(bid(1, 5, 100)).await.unwrap();

        let found = store
            .find_by_reservation_id("res-1-5")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, saved.id);

        assert!(store
            .find_by_reservation_id("missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn should_find_top_bid_by_amount() {
        let store = MemoryStore::new();
        store.insert_bid(bid(1, 5, 100)).await.unwrap();
        store.insert_bid(bid(1, 6, 150)).await.unwrap();
        store.insert_bid(bid(2, 7, 900)).await.unwrap();

        let top = store.find_top_by_product(1).await.unwrap().unwrap();
        assert_eq!(top.bidder_id, 6);
        assert!(store.bidder_has_bid(5, 1).await.unwrap());
        assert!(!store.bidder_has_bid(5, 2).await.unwrap());
    }
}
