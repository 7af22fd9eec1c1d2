//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name                   | Description                               | Key Methods         |
// |------------------------|-------------------------------------------|---------------------|
// | PlaceBidRequest        | Request to place a bid                    | validated           |
// | BidResponse            | Bid with full details                     | from                |
// | BidSummaryEntry        | One auction the caller participated in    | for_bid             |
// | BiddingStatus          | Caller-relative outcome of an auction     |                     |
//--------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::{Bid, BidStatus, Product};

use super::error::ApiError;

/// Request to place a new bid
///
/// Fields are optional so their absence maps to a clean 400 instead of a
/// deserialization error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    /// Bid amount in minor currency units
    pub amount: Option<i64>,
    /// Identifier of the auctioned product
    pub product_id: Option<i64>,
}

impl PlaceBidRequest {
    /// Extracts the required fields or rejects the request.
    pub fn validated(self) -> Result<(i64, i64), ApiError> {
        let amount = self
            .amount
            .ok_or_else(|| ApiError::BadRequest("amount is required".to_string()))?;
        let product_id = self
            .product_id
            .ok_or_else(|| ApiError::BadRequest("productId is required".to_string()))?;
        if amount <= 0 {
            return Err(ApiError::BadRequest("amount must be positive".to_string()));
        }
        Ok((amount, product_id))
    }
}

/// Response for a bid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidResponse {
    pub bid_id: i64,
    pub amount: i64,
    pub bid_time: DateTime<Utc>,
    pub product_id: i64,
    pub bidder_id: i64,
    pub reservation_id: Option<String>,
    pub status: BidStatus,
}

impl From<Bid> for BidResponse {
    fn from(bid: Bid) -> Self {
        Self {
            bid_id: bid.id,
            amount: bid.amount,
            bid_time: bid.bid_time,
            product_id: bid.product_id,
            bidder_id: bid.bidder_id,
            reservation_id: bid.reservation_id,
            status: bid.status,
        }
    }
}

/// Caller-relative outcome of one auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiddingStatus {
    /// The auction is finalized and the caller bought the product
    Won,
    /// The auction is finalized and someone else (or nobody) bought it
    Lost,
    /// The auction is still open and the caller holds the top bid
    Winning,
    /// The auction is still open and the caller has been outbid
    Outbid,
}

/// One entry in the caller's bidding summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidSummaryEntry {
    pub product_id: i64,
    pub product_name: String,
    pub amount: i64,
    pub status: BiddingStatus,
}

impl BidSummaryEntry {
    /// Classifies the caller's bid against the product's current state.
    pub fn for_bid(bid: &Bid, product: &Product) -> Self {
        let status = if product.frozen {
            if product.sold && product.buyer_id == Some(bid.bidder_id) {
                BiddingStatus::Won
            } else {
                BiddingStatus::Lost
            }
        } else if bid.amount >= product.current_bid {
            BiddingStatus::Winning
        } else {
            BiddingStatus::Outbid
        };

        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            amount: bid.amount,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::BidStatus;

    fn product(frozen: bool, sold: bool, buyer_id: Option<i64>, current_bid: i64) -> Product {
        Product {
            id: 9,
            name: "Vintage clock".to_string(),
            description: String::new(),
            category: "antiques".to_string(),
            min_bid: 10,
            max_bid: 1_000,
            current_bid,
            frozen,
            sold,
            end_time: Utc::now(),
            seller_id: 2,
            buyer_id,
            version: 0,
        }
    }

    fn bid(bidder_id: i64, amount: i64) -> Bid {
        Bid {
            id: 1,
            amount,
            bid_time: Utc::now(),
            product_id: 9,
            bidder_id,
            email: "b@example.com".to_string(),
            reservation_id: None,
            status: BidStatus::Pending,
        }
    }

    #[test]
    fn should_classify_buyer_of_sold_product_as_won() {
        let entry = BidSummaryEntry::for_bid(&bid(5, 120), &product(true, true, Some(5), 120));
        assert_eq!(entry.status, BiddingStatus::Won);
    }

    #[test]
    fn should_classify_non_buyer_of_finalized_product_as_lost() {
        let entry = BidSummaryEntry::for_bid(&bid(5, 120), &product(true, true, Some(8), 150));
        assert_eq!(entry.status, BiddingStatus::Lost);
    }

    #[test]
    fn should_classify_top_bid_on_open_product_as_winning() {
        let entry = BidSummaryEntry::for_bid(&bid(5, 150), &product(false, false, None, 150));
        assert_eq!(entry.status, BiddingStatus::Winning);
    }

    #[test]
    fn should_classify_lower_bid_on_open_product_as_outbid() {
        let entry = BidSummaryEntry::for_bid(&bid(5, 120), &product(false, false, None, 150));
        assert_eq!(entry.status, BiddingStatus::Outbid);
    }

    #[test]
    fn should_reject_request_without_amount() {
        let req = PlaceBidRequest {
            amount: None,
            product_id: Some(9),
        };
        assert!(req.validated().is_err());
    }
}
