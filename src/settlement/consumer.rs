//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Reconciles asynchronous payment confirmations against pending bids.
//
// The payment service confirms (or rejects) captures out of band on the
// `events` exchange. Deliveries are at-least-once with manual acks, so every
// handler here must tolerate redelivery: a bid that already reached its
// terminal status is left alone and, crucially, no winner or loser
// notification is published again.
//
// Correlation prefers `reservationId`. When the reservation id is absent or
// matches no bid, the event falls back to a weaker close keyed on
// `auctionId`: the product is frozen without recording a buyer or publishing
// notifications, and the top bid is marked paid best-effort.
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::types::{Bid, BidStatus, Product};
use crate::events::{
    AUCTION_LOSER, AUCTION_WINNER, AuctionNotification, NotificationPublisher, PAYMENT_FAILED,
    PAYMENT_SUCCESS, PaymentEvent,
};
use crate::storage::{BidStore, ProductStore, StorageError};

/// Errors from processing one payment event delivery.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The delivery cannot be interpreted.
    #[error("malformed payment event: {0}")]
    Malformed(String),

    /// The store failed; the delivery will be redelivered and retried.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Consumes `payment.success` / `payment.failed` and settles the
/// corresponding bid and product.
pub struct PaymentEventConsumer {
    products: Arc<dyn ProductStore>,
    bids: Arc<dyn BidStore>,
    notifier: Arc<dyn NotificationPublisher>,
}

impl PaymentEventConsumer {
    pub fn new(
        products: Arc<dyn ProductStore>,
        bids: Arc<dyn BidStore>,
        notifier: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            products,
            bids,
            notifier,
        }
    }

    /// Drains a subscription until it closes.
    ///
    /// Each delivery is acked once processed; failures are nacked with
    /// requeue so the broker redelivers (at-least-once).
    pub async fn run(&self, mut subscription: rabbitmq::TopicSubscription) {
        info!(
            "Payment event consumer listening on queue {}",
            subscription.queue_name()
        );

        while let Some(message) = subscription.receive().await {
            let routing_key = message
                .deliver
                .as_ref()
                .map(|deliver| deliver.routing_key().to_owned())
                .unwrap_or_default();
            let body = message.content.clone().unwrap_or_default();

            match self.process(&routing_key, &body).await {
                Ok(()) => {
                    if let Err(err) = subscription.ack(&message).await {
                        error!("Failed to ack {} delivery: {}", routing_key, err);
                    }
                }
                Err(err) => {
                    warn!(
                        "Failed to process {} delivery, requeueing: {}",
                        routing_key, err
                    );
                    if let Err(nack_err) = subscription.nack(&message, true).await {
                        error!("Failed to nack {} delivery: {}", routing_key, nack_err);
                    }
                }
            }
        }

        warn!("Payment event subscription closed");
    }

    /// Processes one delivery body under the given routing key.
    pub async fn process(&self, routing_key: &str, body: &[u8]) -> Result<(), ProcessError> {
        let event: PaymentEvent = serde_json::from_slice(body)
            .map_err(|err| ProcessError::Malformed(err.to_string()))?;

        match routing_key {
            PAYMENT_SUCCESS => self.on_payment_success(event).await,
            PAYMENT_FAILED => self.on_payment_failed(event).await,
            other => Err(ProcessError::Malformed(format!(
                "unexpected routing key '{}'",
                other
            ))),
        }
    }

    async fn on_payment_success(&self, event: PaymentEvent) -> Result<(), ProcessError> {
        if let Some(reservation_id) = event.reservation_id() {
            match self.bids.find_by_reservation_id(reservation_id).await? {
                Some(bid) => return self.settle_paid_bid(bid).await,
                None => {
                    // An unmatched reservation id is treated like an absent
                    // one: try the auction id fallback.
                    warn!(
                        "No bid found for reservation {}, trying auction id fallback",
                        reservation_id
                    );
                }
            }
        }

        match event.auction_id() {
            Some(auction_id) => {
                info!(
                    "payment.success without a matched reservation, falling back to auction {}",
                    auction_id
                );
                self.settle_by_auction(auction_id).await
            }
            None if event.reservation_id().is_none() => Err(ProcessError::Malformed(
                "payment.success carries neither reservationId nor auctionId".to_string(),
            )),
            None => Ok(()),
        }
    }

    /// Marks the bid paid and finalizes its product.
    ///
    /// Redelivery guard: a bid already in a terminal status is left alone
    /// and nothing is published.
    async fn settle_paid_bid(&self, bid: Bid) -> Result<(), ProcessError> {
        match bid.status {
            BidStatus::Paid => {
                info!(
                    "Bid {} already settled as paid, skipping redelivery",
                    bid.id
                );
                return Ok(());
            }
            BidStatus::Failed => {
                warn!(
                    "payment.success for bid {} that already failed, dropping",
                    bid.id
                );
                return Ok(());
            }
            BidStatus::Pending => {}
        }

        let mut paid = bid;
        paid.status = BidStatus::Paid;
        let paid = self.bids.save_bid(paid).await?;
        info!("Bid {} marked as PAID", paid.id);

        let Some(product) = self.products.find_product(paid.product_id).await? else {
            warn!(
                "Bid {} references missing product {}, nothing to finalize",
                paid.id, paid.product_id
            );
            return Ok(());
        };

        if product.sold {
            info!(
                "Product {} already sold, bid status update was the only action",
                product.id
            );
            return Ok(());
        }

        // A product closed unsold (frozen, no buyer) is still recoverable
        // here: a confirmed capture upgrades it to sold.
        self.finalize_and_notify(product, &paid).await
    }

    /// Fallback path for events whose reservation id is absent or matches
    /// no bid. A weaker guarantee than the reservation path: the product is
    /// frozen without recording a buyer and nothing is published; the top
    /// bid is marked paid best-effort.
    async fn settle_by_auction(&self, auction_id: i64) -> Result<(), ProcessError> {
        let Some(product) = self.products.find_product(auction_id).await? else {
            warn!("payment.success for unknown auction {}, dropping", auction_id);
            return Ok(());
        };

        if !product.sold && !product.frozen {
            let expected_version = product.version;
            let mut updated = product;
            updated.close_unsold();
            let id = updated.id;

            match self.products.update_versioned(updated, expected_version).await {
                Ok(_) => info!("Product {} frozen via payment event fallback", id),
                Err(StorageError::VersionConflict(id)) => {
                    info!(
                        "Product {} moved concurrently, leaving it to the other path",
                        id
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        let Some(top) = self.bids.find_top_by_product(auction_id).await? else {
            warn!("payment.success for auction {} with no bids", auction_id);
            return Ok(());
        };
        match top.status {
            BidStatus::Pending => {
                let mut paid = top;
                paid.status = BidStatus::Paid;
                let paid = self.bids.save_bid(paid).await?;
                info!("Top bid {} marked as PAID via fallback", paid.id);
            }
            BidStatus::Paid => {}
            BidStatus::Failed => {
                warn!(
                    "Top bid {} on auction {} already failed, leaving it",
                    top.id, auction_id
                );
            }
        }

        Ok(())
    }

    /// Finalizes the product through the compare-and-set and, when this
    /// path did the finalizing, publishes the winner and loser
    /// notifications.
    ///
    /// A lost compare-and-set is re-read: if the product sold elsewhere the
    /// winning path owns the notifications, but a concurrent unsold close
    /// does not outrank a confirmed capture, so the update is retried on
    /// the fresh row.
    async fn finalize_and_notify(
        &self,
        mut product: Product,
        winner: &Bid,
    ) -> Result<(), ProcessError> {
        let finalized = loop {
            let expected_version = product.version;
            let mut updated = product.clone();
            updated.mark_sold(winner.bidder_id);

            match self
                .products
                .update_versioned(updated, expected_version)
                .await
            {
                Ok(saved) => {
                    info!(
                        "Product {} marked as sold to {} via payment event",
                        saved.id, winner.bidder_id
                    );
                    break saved;
                }
                Err(StorageError::VersionConflict(id)) => {
                    let Some(current) = self.products.find_product(id).await? else {
                        warn!("Product {} vanished during finalization", id);
                        return Ok(());
                    };
                    if current.sold {
                        // The scheduler finalized first and owns the
                        // notifications.
                        info!(
                            "Product {} was finalized concurrently, skipping notifications",
                            id
                        );
                        return Ok(());
                    }
                    product = current;
                }
                Err(err) => return Err(err.into()),
            }
        };

        if let Err(err) = self.notifier.publish_notification(
            AUCTION_WINNER,
            &AuctionNotification::winner(winner, &finalized),
        ) {
            warn!(
                "Failed to publish winner notification for product {}: {}",
                finalized.id, err
            );
        }

        let others = self.bids.find_by_product(finalized.id).await?;
        for other in others.iter().filter(|other| other.id != winner.id) {
            if let Err(err) = self
                .notifier
                .publish_notification(AUCTION_LOSER, &AuctionNotification::loser(other, &finalized))
            {
                warn!(
                    "Failed to publish loser notification for product {}: {}",
                    finalized.id, err
                );
            }
        }

        Ok(())
    }

    async fn on_payment_failed(&self, event: PaymentEvent) -> Result<(), ProcessError> {
        let Some(reservation_id) = event.reservation_id() else {
            warn!("payment.failed without reservation id, nothing to correlate");
            return Ok(());
        };

        let Some(bid) = self.bids.find_by_reservation_id(reservation_id).await? else {
            warn!("No bid found for reservation {}, dropping", reservation_id);
            return Ok(());
        };

        match bid.status {
            BidStatus::Failed => {
                info!(
                    "Bid {} already settled as failed, skipping redelivery",
                    bid.id
                );
                Ok(())
            }
            BidStatus::Paid => {
                warn!(
                    "payment.failed for bid {} that already succeeded, dropping",
                    bid.id
                );
                Ok(())
            }
            BidStatus::Pending => {
                let mut failed = bid;
                failed.status = BidStatus::Failed;
                let failed = self.bids.save_bid(failed).await?;
                // The product row is untouched: the scheduler's cascade (or a
                // later success event) decides the auction outcome.
                info!("Bid {} marked as FAILED", failed.id);
                Ok(())
            }
        }
    }
}
