//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name                  | Description                                      | Key Methods     |
// |-----------------------|--------------------------------------------------|-----------------|
// | BidReservationService | Validates a bid, reserves funds, persists it     | place_bid       |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::types::{Bid, BidStatus, Product, RequestContext};
use crate::gateway::PaymentGateway;
use crate::storage::{BidStore, ProductStore, StorageError};

/// Errors surfaced by bid placement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaceBidError {
    /// The request is invalid or the auction cannot accept this bid (400).
    #[error("{0}")]
    Validation(String),

    /// The payment gateway refused to reserve funds (402).
    #[error("payment_reserve_failed: {reason}")]
    PaymentReserveFailed { reason: String },

    /// The stores failed underneath us (500).
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl PlaceBidError {
    fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }
}

/// Synchronous bid placement: validate, freeze funds, persist a pending bid.
pub struct BidReservationService {
    products: Arc<dyn ProductStore>,
    bids: Arc<dyn BidStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl BidReservationService {
    pub fn new(
        products: Arc<dyn ProductStore>,
        bids: Arc<dyn BidStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            products,
            bids,
            gateway,
        }
    }

    /// Places a bid for the authenticated principal.
    ///
    /// # Flow
    ///
    /// 1. Loads the product and validates the bid against it
    /// 2. Reserves funds synchronously via the payment gateway
    /// 3. Re-loads the product and re-checks the amount (narrows, but does
    ///    not eliminate, the race window between two concurrent bidders)
    /// 4. Persists the bid as PENDING and raises the product's current bid
    ///
    /// Finalization happens asynchronously, on `payment.success` or when the
    /// settlement scheduler closes the auction.
    ///
    /// # Errors
    ///
    /// * `Validation` when the product is missing, closed, ended, out of
    ///   bounds, already bid on by this bidder, or outbid
    /// * `PaymentReserveFailed` when the gateway denies the reservation
    /// * `Storage` when persistence fails
    pub async fn place_bid(
        &self,
        ctx: &RequestContext,
        amount: i64,
        product_id: i64,
    ) -> Result<Bid, PlaceBidError> {
        let product = self
            .products
            .find_product(product_id)
            .await?
            .ok_or_else(|| PlaceBidError::validation("Product not found"))?;

        self.validate_against(&product, ctx, amount).await?;

        // Reserve payment synchronously.
        info!(
            "Payment reserve: bidder_id={} amount={} email={}",
            ctx.user_id, amount, ctx.email
        );
        let reservation = self.gateway.freeze(ctx.user_id, amount, &ctx.email).await;
        if !reservation.ok {
            let reason = reservation
                .reason
                .unwrap_or_else(|| "insufficient_funds".to_string());
            warn!(
                "Payment reserve denied for bidder {}: {}",
                ctx.user_id, reason
            );
            return Err(PlaceBidError::PaymentReserveFailed { reason });
        }

        // Re-fetch the product (to reduce the race window) and check the
        // current bid again.
        let fresh = self
            .products
            .find_product(product_id)
            .await?
            .ok_or_else(|| PlaceBidError::validation("Product not found"))?;
        if amount <= fresh.current_bid {
            // Release the reservation? For now we return failure and let the
            // payment provider handle expiry.
            error!(
                "Race detected on product {}: bid {} no longer above current {}",
                product_id, amount, fresh.current_bid
            );
            return Err(PlaceBidError::validation(
                "Bid not higher than current (race detected)",
            ));
        }

        let bid = Bid {
            id: 0,
            amount,
            bid_time: Utc::now(),
            product_id,
            bidder_id: ctx.user_id,
            email: ctx.email.clone(),
            reservation_id: reservation.reservation_id,
            status: BidStatus::Pending,
        };
        let saved = self.bids.insert_bid(bid).await?;

        let mut fresh = fresh;
        fresh.current_bid = amount;
        self.products.save_product(fresh).await?;

        info!(
            "Bid placed successfully: bid_id={} product_id={} amount={}",
            saved.id, product_id, amount
        );
        Ok(saved)
    }

    /// First-pass validation against the loaded product.
    async fn validate_against(
        &self,
        product: &Product,
        ctx: &RequestContext,
        amount: i64,
    ) -> Result<(), PlaceBidError> {
        if amount < product.min_bid {
            return Err(PlaceBidError::validation("Bid below minimum"));
        }
        if amount > product.max_bid {
            return Err(PlaceBidError::validation("Bid above maximum"));
        }
        if self.bids.bidder_has_bid(ctx.user_id, product.id).await? {
            return Err(PlaceBidError::validation("User already bid"));
        }
        if product.frozen {
            return Err(PlaceBidError::validation("Auction closed"));
        }
        if product.is_expired(Utc::now()) {
            return Err(PlaceBidError::validation("Auction has ended"));
        }
        if amount <= product.current_bid {
            return Err(PlaceBidError::validation("Bid not higher than current"));
        }
        Ok(())
    }
}
