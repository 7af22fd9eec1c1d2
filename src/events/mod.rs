//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Wire types and the publishing seam for the `events` topic exchange.
//
// Consumed routing keys: payment.success, payment.failed
// Published routing keys: auction.winner, auction.loser
//
// Identifier fields travel as strings on the wire (the notification service
// treats them opaquely), so the payload structs keep them as strings and
// expose typed accessors where the consumer needs numbers.
//--------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::domain::types::{Bid, Product};

/// Name of the shared topic exchange.
pub const EVENTS_EXCHANGE: &str = "events";

/// Routing key for asynchronous payment confirmations.
pub const PAYMENT_SUCCESS: &str = "payment.success";
/// Routing key for asynchronous payment rejections.
pub const PAYMENT_FAILED: &str = "payment.failed";
/// Routing key for winner notifications.
pub const AUCTION_WINNER: &str = "auction.winner";
/// Routing key for loser notifications.
pub const AUCTION_LOSER: &str = "auction.loser";

/// Body of a `payment.success` / `payment.failed` event.
///
/// Any field may be missing; correlation prefers `reservationId` and falls
/// back to `auctionId`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub auction_id: Option<String>,
    #[serde(default)]
    pub reservation_id: Option<String>,
}

impl PaymentEvent {
    /// Reservation id, treating an empty string as absent.
    pub fn reservation_id(&self) -> Option<&str> {
        self.reservation_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Auction id parsed to the product key, if present and numeric.
    pub fn auction_id(&self) -> Option<i64> {
        self.auction_id.as_deref()?.parse().ok()
    }
}

/// Body of an `auction.winner` / `auction.loser` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionNotification {
    pub user_id: String,
    pub amount: i64,
    pub auction_id: String,
    pub reservation_id: String,
    pub message: String,
}

impl AuctionNotification {
    /// Winner payload for the bid that captured the product.
    pub fn winner(bid: &Bid, product: &Product) -> Self {
        Self {
            user_id: bid.bidder_id.to_string(),
            amount: bid.amount,
            auction_id: product.id.to_string(),
            reservation_id: bid.reservation_id.clone().unwrap_or_default(),
            message: format!(
                "Congratulations! You won the auction for '{}' with bid {}",
                product.name, bid.amount
            ),
        }
    }

    /// Loser payload for a bid that did not win.
    pub fn loser(bid: &Bid, product: &Product) -> Self {
        Self {
            user_id: bid.bidder_id.to_string(),
            amount: bid.amount,
            auction_id: product.id.to_string(),
            reservation_id: bid.reservation_id.clone().unwrap_or_default(),
            message: format!(
                "Your bid of {} did not win for '{}'",
                bid.amount, product.name
            ),
        }
    }
}

/// Publishing seam for auction notifications.
///
/// Implemented over the topic-exchange publisher in production; tests swap
/// in a recording double. Settlement treats publication as best-effort:
/// failures are logged and never abort the protocol step that caused them.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationPublisher: Send + Sync {
    /// Publishes a notification under the given routing key.
    fn publish_notification(
        &self,
        routing_key: &str,
        notification: &AuctionNotification,
    ) -> Result<(), rabbitmq::RabbitMQError>;
}

/// Notification publisher backed by the RabbitMQ topic exchange.
pub struct RabbitNotificationPublisher {
    dispatcher: rabbitmq::PublisherDispatcher,
}

impl RabbitNotificationPublisher {
    pub fn new(dispatcher: rabbitmq::PublisherDispatcher) -> Self {
        Self { dispatcher }
    }
}

impl NotificationPublisher for RabbitNotificationPublisher {
    fn publish_notification(
        &self,
        routing_key: &str,
        notification: &AuctionNotification,
    ) -> Result<(), rabbitmq::RabbitMQError> {
        let content =
            serde_json::to_vec(notification).map_err(|_| rabbitmq::RabbitMQError::PublishError)?;
        self.dispatcher.publish(routing_key, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::BidStatus;
    use chrono::Utc;

    fn sample_product() -> Product {
        Product {
            id: 12,
            name: "Vintage clock".to_string(),
            description: String::new(),
            category: "antiques".to_string(),
            min_bid: 10,
            max_bid: 500,
            current_bid: 150,
            frozen: false,
            sold: false,
            end_time: Utc::now(),
            seller_id: 3,
            buyer_id: None,
            version: 0,
        }
    }

    fn sample_bid() -> Bid {
        Bid {
            id: 4,
            amount: 150,
            bid_time: Utc::now(),
            product_id: 12,
            bidder_id: 77,
            email: "bidder@example.com".to_string(),
            reservation_id: Some("res-abc".to_string()),
            status: BidStatus::Pending,
        }
    }

    #[test]
    fn should_parse_payment_event_with_missing_fields() {
        let event: PaymentEvent = serde_json::from_str(r#"{"auctionId":"12"}"#).unwrap();
        assert_eq!(event.reservation_id(), None);
        assert_eq!(event.auction_id(), Some(12));
    }

    #[test]
    fn should_treat_empty_reservation_id_as_absent() {
        let event: PaymentEvent =
            serde_json::from_str(r#"{"reservationId":"","auctionId":"not-a-number"}"#).unwrap();
        assert_eq!(event.reservation_id(), None);
        assert_eq!(event.auction_id(), None);
    }

    #[test]
    fn should_build_winner_payload_with_string_ids() {
        let notification = AuctionNotification::winner(&sample_bid(), &sample_product());
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["userId"], "77");
        assert_eq!(value["auctionId"], "12");
        assert_eq!(value["reservationId"], "res-abc");
        assert_eq!(value["amount"], 150);
        assert_eq!(
            value["message"],
            "Congratulations! You won the auction for 'Vintage clock' with bid 150"
        );
    }

    #[test]
    fn should_build_loser_payload_message() {
        let notification = AuctionNotification::loser(&sample_bid(), &sample_product());
        assert_eq!(
            notification.message,
            "Your bid of 150 did not win for 'Vintage clock'"
        );
    }
}
