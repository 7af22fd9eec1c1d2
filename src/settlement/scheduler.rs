//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Periodic batch job that closes expired auctions.
//
// For each product past its deadline and still open, the scheduler walks the
// bids in descending amount order and tries to capture (deduct) each one in
// turn; the first successful capture wins the auction. Settlement attempts
// for one product are strictly sequential - charging two bidders for one
// item must never happen - and the cascade only moves on after the previous
// attempt is known to have failed.
//
// The state machine per product:
//
//   OPEN -> SOLD           first successful deduct
//   OPEN -> CLOSED_UNSOLD  no bids, or every deduct failed
//
// Both terminal states set `frozen` through the store's compare-and-set so
// a concurrent finalization by the payment event consumer cannot be
// overwritten.
//
// | Name                       | Description                                | Key Methods   |
// |----------------------------|--------------------------------------------|---------------|
// | AuctionSettlementScheduler | Interval-driven settlement batch           | start,        |
// |                            |                                            | run_once,     |
// |                            |                                            | settle_product|
// | SettlementOutcome          | Terminal outcome of settling one product   |               |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::types::{Bid, Product};
use crate::events::{AUCTION_LOSER, AUCTION_WINNER, AuctionNotification, NotificationPublisher};
use crate::gateway::PaymentGateway;
use crate::storage::{BidStore, ProductStore, StorageError, StorageResult};

/// Source tag passed to the gateway on seller payouts.
const DEPOSIT_SOURCE: &str = "auction_sale";

/// Terminal outcome of settling a single product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// A capture succeeded; the product is sold to this bidder.
    Sold { buyer_id: i64 },
    /// Every capture attempt failed; the product is closed unsold.
    ClosedUnsold,
    /// There were no bids; the product is closed unsold.
    NoBids,
    /// Another path finalized the product first; nothing left to do here.
    AlreadyFinalized,
}

/// Interval-driven batch job closing expired auctions.
pub struct AuctionSettlementScheduler {
    products: Arc<dyn ProductStore>,
    bids: Arc<dyn BidStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationPublisher>,
    interval: Duration,
    /// Guards against overlapping runs; a tick that finds the previous run
    /// still holding the guard is skipped.
    run_guard: Mutex<()>,
}

impl AuctionSettlementScheduler {
    pub fn new(
        products: Arc<dyn ProductStore>,
        bids: Arc<dyn BidStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationPublisher>,
        interval: Duration,
    ) -> Self {
        Self {
            products,
            bids,
            gateway,
            notifier,
            interval,
            run_guard: Mutex::new(()),
        }
    }

    /// Spawns the scheduler loop.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.run_guard.try_lock() {
                    Ok(_guard) => self.run_once().await,
                    Err(_) => {
                        warn!("Previous settlement run still in progress, skipping tick");
                    }
                }
            }
        })
    }

    /// One settlement pass over every expired, still-open product.
    ///
    /// A failure on a single product is logged and does not abort the rest
    /// of the batch.
    pub async fn run_once(&self) {
        let now = Utc::now();
        let products = match self.products.find_expired_open(now).await {
            Ok(products) => products,
            Err(err) => {
                error!("Failed to load expired products: {}", err);
                return;
            }
        };
        info!("Found {} products to evaluate for closing", products.len());

        for product in products {
            let product_id = product.id;
            match self.settle_product(product).await {
                Ok(outcome) => {
                    info!("Product {} settled: {:?}", product_id, outcome);
                }
                Err(err) => {
                    error!("Failed to settle product {}: {}", product_id, err);
                }
            }
        }
    }

    /// Settles one product: cascade capture, then finalize.
    pub async fn settle_product(&self, product: Product) -> StorageResult<SettlementOutcome> {
        let bids = self.bids.find_by_product(product.id).await?;

        if bids.is_empty() {
            info!(
                "No bids found for product id {}. Marking as closed (unsold).",
                product.id
            );
            return match self.close_unsold(product).await? {
                Some(_) => Ok(SettlementOutcome::NoBids),
                None => Ok(SettlementOutcome::AlreadyFinalized),
            };
        }

        // Descending amount; equal amounts settle earliest-bid-first.
        let mut sorted = bids;
        sorted.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.bid_time.cmp(&b.bid_time)));

        for (index, candidate) in sorted.iter().enumerate() {
            let Some(reservation_id) = candidate.reservation_id.as_deref() else {
                warn!(
                    "Bid {} on product {} has no reservation id, skipping",
                    candidate.id, product.id
                );
                continue;
            };

            info!(
                "Trying to deduct {} from user {} (reservation={}) for product {}",
                candidate.amount, candidate.bidder_id, reservation_id, product.id
            );
            let outcome = self
                .gateway
                .deduct(
                    candidate.bidder_id,
                    candidate.amount,
                    product.id,
                    reservation_id,
                    &candidate.email,
                )
                .await;

            if !outcome.ok {
                warn!(
                    "Deduct failed for user {} amount {} reservation {}: {}",
                    candidate.bidder_id,
                    candidate.amount,
                    reservation_id,
                    outcome.reason.as_deref().unwrap_or("unknown")
                );
                continue;
            }

            info!(
                "Deduct succeeded for user {} amount {} reservation {}",
                candidate.bidder_id, candidate.amount, reservation_id
            );
            let (finalized, newly_finalized) = self.finalize_sold(product, candidate).await?;
            self.run_sale_side_effects(&finalized, candidate, &sorted, index, newly_finalized)
                .await;
            return Ok(SettlementOutcome::Sold {
                buyer_id: candidate.bidder_id,
            });
        }

        // Every capture failed: close unsold and release the reservations.
        warn!(
            "No deduct succeeded for product {}. Marking closed and unfreezing reservations.",
            product.id
        );
        let product_id = product.id;
        match self.close_unsold(product).await? {
            Some(_) => {
                for bid in &sorted {
                    if bid.reservation_id.is_some() {
                        self.unfreeze_best_effort(bid).await;
                    }
                }
                Ok(SettlementOutcome::ClosedUnsold)
            }
            None => {
                // The consumer sold it while we were cascading; the
                // reservations now belong to that outcome.
                info!(
                    "Product {} was finalized elsewhere during cascade",
                    product_id
                );
                Ok(SettlementOutcome::AlreadyFinalized)
            }
        }
    }

    /// Marks the product sold through the versioned compare-and-set.
    ///
    /// Losing the compare-and-set means the payment event consumer
    /// finalized the same capture first. The consumer owns the winner and
    /// loser notifications in that case, but the payout and unfreeze duties
    /// stay with the scheduler either way, so the caller gets the current
    /// row back plus a flag telling it whether this path did the finalizing.
    async fn finalize_sold(&self, product: Product, winner: &Bid) -> StorageResult<(Product, bool)> {
        let expected_version = product.version;
        let mut updated = product;
        updated.mark_sold(winner.bidder_id);

        match self
            .products
            .update_versioned(updated.clone(), expected_version)
            .await
        {
            Ok(saved) => {
                info!(
                    "DB update SUCCESS: Product id {} marked as sold, buyer set to {}, and frozen.",
                    saved.id, winner.bidder_id
                );
                Ok((saved, true))
            }
            Err(StorageError::VersionConflict(id)) => {
                let current = self
                    .products
                    .find_product(id)
                    .await?
                    .ok_or(StorageError::NotFound("product", id))?;
                if current.sold && current.buyer_id == Some(winner.bidder_id) {
                    warn!(
                        "Product {} already finalized for the same buyer, continuing side effects",
                        id
                    );
                    Ok((current, false))
                } else {
                    // The deduct already captured the winner's funds and no
                    // automatic refund exists at the gateway; this needs an
                    // operator to reconcile.
                    error!(
                        "Product {} finalized with a different outcome (buyer {:?}); \
                         captured {} from user {} (reservation={:?}) is NOT compensated",
                        id,
                        current.buyer_id,
                        winner.amount,
                        winner.bidder_id,
                        winner.reservation_id
                    );
                    Err(StorageError::VersionConflict(id))
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Seller payout, winner/loser notifications and loser unfreezes.
    /// Each step is best-effort: failures are logged and never unwind the
    /// completed sale. Notifications are skipped when another path did the
    /// finalizing, since that path already published them.
    async fn run_sale_side_effects(
        &self,
        product: &Product,
        winner: &Bid,
        sorted: &[Bid],
        winner_index: usize,
        notify: bool,
    ) {
        let deposit = self
            .gateway
            .deposit(product.seller_id, winner.amount, DEPOSIT_SOURCE)
            .await;
        if deposit.ok {
            info!(
                "Deposited {} to seller {} for product {}",
                winner.amount, product.seller_id, product.id
            );
        } else {
            warn!(
                "Failed to deposit to seller {} for product {}: {}",
                product.seller_id,
                product.id,
                deposit.reason.as_deref().unwrap_or("unknown")
            );
        }

        if notify {
            if let Err(err) = self
                .notifier
                .publish_notification(AUCTION_WINNER, &AuctionNotification::winner(winner, product))
            {
                warn!(
                    "Failed to publish winner notification for product {}: {}",
                    product.id, err
                );
            }
        }

        for (index, other) in sorted.iter().enumerate() {
            if index == winner_index {
                continue;
            }
            if notify {
                if let Err(err) = self
                    .notifier
                    .publish_notification(AUCTION_LOSER, &AuctionNotification::loser(other, product))
                {
                    warn!(
                        "Failed to publish loser notification for product {}: {}",
                        product.id, err
                    );
                }
            }
            if other.reservation_id.is_some() {
                self.unfreeze_best_effort(other).await;
            }
        }
    }

    /// Closes the product unsold through the compare-and-set.
    ///
    /// Returns `None` when the row moved underneath us, meaning another
    /// path already finalized the product.
    async fn close_unsold(&self, product: Product) -> StorageResult<Option<Product>> {
        let expected_version = product.version;
        let mut updated = product;
        updated.close_unsold();
        let id = updated.id;

        match self.products.update_versioned(updated, expected_version).await {
            Ok(saved) => {
                info!(
                    "DB update SUCCESS: Product id {} marked as frozen (unsold) and saved.",
                    id
                );
                Ok(Some(saved))
            }
            Err(StorageError::VersionConflict(_)) => Ok(None),
            Err(err) => {
                error!(
                    "DB update FAILED: Could not save product id {} as frozen (unsold): {}",
                    id, err
                );
                Err(err)
            }
        }
    }

    async fn unfreeze_best_effort(&self, bid: &Bid) {
        let outcome = self.gateway.unfreeze(bid.bidder_id, bid.amount).await;
        if outcome.ok {
            info!(
                "Unfroze {} for user {} (reservation={:?})",
                bid.amount, bid.bidder_id, bid.reservation_id
            );
        } else {
            warn!(
                "Failed to unfreeze for user {} reservation {:?}: {}",
                bid.bidder_id,
                bid.reservation_id,
                outcome.reason.as_deref().unwrap_or("unknown")
            );
        }
    }
}
