//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module defines the core data types used throughout the settlement service:
// the Bid and Product aggregates and the authenticated request context.
//
// | Section            | Description                                                      |
// |--------------------|------------------------------------------------------------------|
// | ENUMS              | Defines discrete sets of values (BidStatus).                     |
// | STRUCTS            | Defines the structure of Bids, Products and RequestContext.      |
// | TESTS              | Contains unit tests for the defined types.                       |
//--------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents the settlement status of a bid.
///
/// The status is monotonic: once a bid leaves `Pending` it never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BidStatus {
    /// Funds are reserved (frozen) but not yet captured.
    Pending,
    /// Frozen funds were captured; this bid won the auction.
    Paid,
    /// The payment gateway rejected the capture for this bid.
    Failed,
}

impl BidStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Pending -> Paid` and `Pending -> Failed` are the only real moves;
    /// re-applying the current status is allowed so redelivered events
    /// stay no-ops.
    pub fn can_transition_to(self, next: BidStatus) -> bool {
        match (self, next) {
            (Self::Pending, _) => true,
            (current, next) => current == next,
        }
    }
}

/// A bid placed on a product.
///
/// Created when a bid is accepted; mutated only by the settlement scheduler
/// or the payment event consumer; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: i64,
    /// Bid amount in whole money units. Always positive.
    pub amount: i64,
    pub bid_time: DateTime<Utc>,
    pub product_id: i64,
    pub bidder_id: i64,
    pub email: String,
    /// Opaque reservation id returned by the gateway freeze call.
    /// Unique per bid and immutable once assigned.
    pub reservation_id: Option<String>,
    pub status: BidStatus,
}

/// A product under auction.
///
/// `frozen` is terminal: once set, no further bids are accepted and
/// `current_bid` stops moving. `sold == true` implies `frozen == true`
/// and a `buyer_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: String,
    pub min_bid: i64,
    pub max_bid: i64,
    /// Highest accepted bid amount so far. Monotonically non-decreasing
    /// while the product is open.
    pub current_bid: i64,
    pub frozen: bool,
    pub sold: bool,
    pub end_time: DateTime<Utc>,
    pub seller_id: i64,
    /// Set exactly once, when the product is sold.
    pub buyer_id: Option<i64>,
    /// Optimistic-concurrency version, bumped by the store on every write.
    /// Finalization goes through a compare-and-set on this field.
    pub version: u64,
}

impl Product {
    /// Whether the auction deadline has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }

    /// Finalizes the product as sold to `buyer_id`.
    pub fn mark_sold(&mut self, buyer_id: i64) {
        self.sold = true;
        self.frozen = true;
        self.buyer_id = Some(buyer_id);
    }

    /// Closes the product without a buyer (no bids, or every capture failed).
    pub fn close_unsold(&mut self) {
        self.frozen = true;
    }
}

/// Immutable per-request authentication context.
///
/// The API gateway verifies the JWT and stamps the principal onto the
/// request headers; this struct carries it explicitly through the call
/// chain instead of relying on ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i64,
    pub email: String,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_product(end_in_secs: i64) -> Product {
        Product {
            id: 1,
            name: "Vintage clock".to_string(),
            description: "A clock".to_string(),
            category: "antiques".to_string(),
            min_bid: 10,
            max_bid: 1000,
            current_bid: 0,
            frozen: false,
            sold: false,
            end_time: Utc::now() + Duration::seconds(end_in_secs),
            seller_id: 7,
            buyer_id: None,
            version: 0,
        }
    }

    #[test]
    fn should_allow_pending_to_paid_and_failed() {
        assert!(BidStatus::Pending.can_transition_to(BidStatus::Paid));
        assert!(BidStatus::Pending.can_transition_to(BidStatus::Failed));
    }

    #[test]
    fn should_reject_transitions_back_to_pending() {
        assert!(!BidStatus::Paid.can_transition_to(BidStatus::Pending));
        assert!(!BidStatus::Failed.can_transition_to(BidStatus::Pending));
        assert!(!BidStatus::Paid.can_transition_to(BidStatus::Failed));
    }

    #[test]
    fn should_treat_reapplied_status_as_legal() {
        assert!(BidStatus::Paid.can_transition_to(BidStatus::Paid));
        assert!(BidStatus::Failed.can_transition_to(BidStatus::Failed));
    }

    #[test]
    fn should_mark_product_sold_with_buyer() {
        let mut product = open_product(60);
        product.mark_sold(42);
        assert!(product.sold);
        assert!(product.frozen);
        assert_eq!(product.buyer_id, Some(42));
    }

    #[test]
    fn should_close_unsold_without_buyer() {
        let mut product = open_product(60);
        product.close_unsold();
        assert!(product.frozen);
        assert!(!product.sold);
        assert_eq!(product.buyer_id, None);
    }

    #[test]
    fn should_detect_expiry() {
        let now = Utc::now();
        assert!(open_product(-5).is_expired(now));
        assert!(!open_product(60).is_expired(now));
    }

    #[test]
    fn should_serialize_status_uppercase() {
        assert_eq!(
            serde_json::to_string(&BidStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(serde_json::to_string(&BidStatus::Paid).unwrap(), "\"PAID\"");
    }
}
