//--------------------------------------------------------------------------------------------------
// TEST MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// End-to-end settlement tests over the in-memory store: place bids, close
// the auction through the scheduler, reconcile payment events through the
// consumer, and verify the dual-path finalization race resolves through the
// versioned compare-and-set.
//--------------------------------------------------------------------------------------------------

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use auction_settlement::domain::types::{BidStatus, Product, RequestContext};
use auction_settlement::events::{
    AUCTION_LOSER, AUCTION_WINNER, AuctionNotification, NotificationPublisher, PAYMENT_SUCCESS,
};
use auction_settlement::gateway::{FreezeOutcome, GatewayOutcome, PaymentGateway};
use auction_settlement::settlement::{
    AuctionSettlementScheduler, BidReservationService, PaymentEventConsumer, SettlementOutcome,
};
use auction_settlement::storage::memory::MemoryStore;
use auction_settlement::{BidStore, ProductStore};

/// Gateway stub that freezes unconditionally and fails deducts for a
/// configured set of bidders, recording every call.
#[derive(Default)]
struct ScriptedGateway {
    failing_bidders: HashSet<i64>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn failing_for(bidders: &[i64]) -> Self {
        Self {
            failing_bidders: bidders.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn freeze(&self, user_id: i64, _amount: i64, _email: &str) -> FreezeOutcome {
        self.calls.lock().unwrap().push(format!("freeze:{}", user_id));
        FreezeOutcome {
            ok: true,
            reservation_id: Some(format!("res-{}", user_id)),
            reason: None,
        }
    }

    async fn deduct(
        &self,
        user_id: i64,
        _amount: i64,
        _auction_id: i64,
        _reservation_id: &str,
        _email: &str,
    ) -> GatewayOutcome {
        self.calls.lock().unwrap().push(format!("deduct:{}", user_id));
        if self.failing_bidders.contains(&user_id) {
            GatewayOutcome::failure("insufficient_funds".to_string())
        } else {
            GatewayOutcome::success(None)
        }
    }

    async fn unfreeze(&self, user_id: i64, _amount: i64) -> GatewayOutcome {
        self.calls
            .lock()
            .unwrap()
            .push(format!("unfreeze:{}", user_id));
        GatewayOutcome::success(None)
    }

    async fn deposit(&self, user_id: i64, _amount: i64, _source: &str) -> GatewayOutcome {
        self.calls
            .lock()
            .unwrap()
            .push(format!("deposit:{}", user_id));
        GatewayOutcome::success(None)
    }
}

/// Publisher stub recording everything handed to it.
#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<(String, AuctionNotification)>>,
}

impl RecordingPublisher {
    fn published(&self) -> Vec<(String, AuctionNotification)> {
        self.published.lock().unwrap().clone()
    }
}

impl NotificationPublisher for RecordingPublisher {
    fn publish_notification(
        &self,
        routing_key: &str,
        notification: &AuctionNotification,
    ) -> Result<(), rabbitmq::RabbitMQError> {
        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), notification.clone()));
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    gateway: Arc<ScriptedGateway>,
    publisher: Arc<RecordingPublisher>,
    reservation: BidReservationService,
    scheduler: AuctionSettlementScheduler,
    consumer: PaymentEventConsumer,
}

fn harness(gateway: ScriptedGateway) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(gateway);
    let publisher = Arc::new(RecordingPublisher::default());

    let products: Arc<dyn ProductStore> = store.clone();
    let bids: Arc<dyn BidStore> = store.clone();

    let reservation =
        BidReservationService::new(products.clone(), bids.clone(), gateway.clone());
    let scheduler = AuctionSettlementScheduler::new(
        products.clone(),
        bids.clone(),
        gateway.clone(),
        publisher.clone(),
        Duration::from_secs(300),
    );
    let consumer = PaymentEventConsumer::new(products, bids, publisher.clone());

    Harness {
        store,
        gateway,
        publisher,
        reservation,
        scheduler,
        consumer,
    }
}

fn auction_product(id: i64) -> Product {
    Product {
        id,
        name: format!("item-{}", id),
        description: String::new(),
        category: "misc".to_string(),
        min_bid: 10,
        max_bid: 10_000,
        current_bid: 0,
        frozen: false,
        sold: false,
        end_time: Utc::now() + ChronoDuration::hours(1),
        seller_id: 7,
        buyer_id: None,
        version: 0,
    }
}

fn bidder(user_id: i64) -> RequestContext {
    RequestContext {
        user_id,
        email: format!("user{}@example.com", user_id),
        role: "user".to_string(),
    }
}

/// Moves the product's deadline into the past so the scheduler picks it up.
async fn expire_product(store: &MemoryStore, id: i64) {
    let mut product = store.find_product(id).await.unwrap().unwrap();
    product.end_time = Utc::now() - ChronoDuration::minutes(1);
    store.save_product(product).await.unwrap();
}

#[tokio::test]
async fn cascade_settles_to_next_bidder_when_top_capture_fails() {
    // Bidder 20 outbids bidder 10, but 20's capture fails at settlement.
    let h = harness(ScriptedGateway::failing_for(&[20]));
    h.store.seed_product(auction_product(1)).await;

    h.reservation
        .place_bid(&bidder(10), 100, 1)
        .await
        .unwrap();
    h.reservation
        .place_bid(&bidder(20), 150, 1)
        .await
        .unwrap();
    expire_product(&h.store, 1).await;

    h.scheduler.run_once().await;

    let product = h.store.find_product(1).await.unwrap().unwrap();
    assert!(product.sold);
    assert!(product.frozen);
    assert_eq!(product.buyer_id, Some(10));

    // Deduct order was descending by amount, the loser was released and the
    // seller was paid.
    let calls = h.gateway.calls();
    let deducts: Vec<&String> = calls.iter().filter(|c| c.starts_with("deduct")).collect();
    assert_eq!(deducts, ["deduct:20", "deduct:10"]);
    assert!(calls.contains(&"unfreeze:20".to_string()));
    assert!(calls.contains(&"deposit:7".to_string()));

    let published = h.publisher.published();
    let winner: Vec<_> = published
        .iter()
        .filter(|(key, _)| key == AUCTION_WINNER)
        .collect();
    let losers: Vec<_> = published
        .iter()
        .filter(|(key, _)| key == AUCTION_LOSER)
        .collect();
    assert_eq!(winner.len(), 1);
    assert_eq!(winner[0].1.user_id, "10");
    assert_eq!(losers.len(), 1);
    assert_eq!(losers[0].1.user_id, "20");
}

#[tokio::test]
async fn exhausted_cascade_closes_unsold_and_releases_everyone() {
    let h = harness(ScriptedGateway::failing_for(&[10, 20]));
    h.store.seed_product(auction_product(1)).await;

    h.reservation
        .place_bid(&bidder(10), 100, 1)
        .await
        .unwrap();
    h.reservation
        .place_bid(&bidder(20), 150, 1)
        .await
        .unwrap();
    expire_product(&h.store, 1).await;

    h.scheduler.run_once().await;

    let product = h.store.find_product(1).await.unwrap().unwrap();
    assert!(product.frozen);
    assert!(!product.sold);
    assert_eq!(product.buyer_id, None);

    let calls = h.gateway.calls();
    assert!(calls.contains(&"unfreeze:10".to_string()));
    assert!(calls.contains(&"unfreeze:20".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("deposit")));
    assert!(h.publisher.published().is_empty());
}

#[tokio::test]
async fn payment_event_settles_bid_and_finalizes_product() {
    let h = harness(ScriptedGateway::default());
    h.store.seed_product(auction_product(1)).await;

    let bid = h
        .reservation
        .place_bid(&bidder(10), 100, 1)
        .await
        .unwrap();
    let reservation_id = bid.reservation_id.clone().unwrap();

    let body = format!(r#"{{"reservationId":"{}"}}"#, reservation_id);
    h.consumer
        .process(PAYMENT_SUCCESS, body.as_bytes())
        .await
        .unwrap();

    let product = h.store.find_product(1).await.unwrap().unwrap();
    assert!(product.sold);
    assert_eq!(product.buyer_id, Some(10));

    let settled = h
        .store
        .find_by_reservation_id(&reservation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, BidStatus::Paid);
}

#[tokio::test]
async fn redelivered_payment_event_does_not_republish() {
    let h = harness(ScriptedGateway::default());
    h.store.seed_product(auction_product(1)).await;

    let bid = h
        .reservation
        .place_bid(&bidder(10), 100, 1)
        .await
        .unwrap();
    let body = format!(
        r#"{{"reservationId":"{}"}}"#,
        bid.reservation_id.clone().unwrap()
    );

    h.consumer
        .process(PAYMENT_SUCCESS, body.as_bytes())
        .await
        .unwrap();
    let version_after_first = h.store.find_product(1).await.unwrap().unwrap().version;

    // Redelivery of the same event.
    h.consumer
        .process(PAYMENT_SUCCESS, body.as_bytes())
        .await
        .unwrap();

    let product = h.store.find_product(1).await.unwrap().unwrap();
    assert_eq!(product.version, version_after_first);

    let winners = h
        .publisher
        .published()
        .iter()
        .filter(|(key, _)| key == AUCTION_WINNER)
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn auction_id_fallback_freezes_without_buyer_and_marks_top_bid_paid() {
    let h = harness(ScriptedGateway::default());
    h.store.seed_product(auction_product(1)).await;

    h.reservation
        .place_bid(&bidder(10), 100, 1)
        .await
        .unwrap();
    h.reservation
        .place_bid(&bidder(20), 150, 1)
        .await
        .unwrap();

    // The event carries no reservation id, only the auction id.
    h.consumer
        .process(PAYMENT_SUCCESS, br#"{"auctionId":"1"}"#)
        .await
        .unwrap();

    let product = h.store.find_product(1).await.unwrap().unwrap();
    assert!(product.frozen);
    assert!(!product.sold);
    assert_eq!(product.buyer_id, None);

    // Top bid (bidder 20's 150) is marked paid; the other stays pending.
    let statuses: Vec<(i64, BidStatus)> = h
        .store
        .find_by_product(1)
        .await
        .unwrap()
        .into_iter()
        .map(|b| (b.bidder_id, b.status))
        .collect();
    assert!(statuses.contains(&(20, BidStatus::Paid)));
    assert!(statuses.contains(&(10, BidStatus::Pending)));

    // The weaker close publishes nothing.
    assert!(h.publisher.published().is_empty());
}

#[tokio::test]
async fn unmatched_reservation_falls_through_to_auction_id() {
    let h = harness(ScriptedGateway::default());
    h.store.seed_product(auction_product(1)).await;

    h.reservation
        .place_bid(&bidder(10), 100, 1)
        .await
        .unwrap();

    h.consumer
        .process(
            PAYMENT_SUCCESS,
            br#"{"reservationId":"no-such-res","auctionId":"1"}"#,
        )
        .await
        .unwrap();

    // The event was not dropped: the auction id path froze the product.
    let product = h.store.find_product(1).await.unwrap().unwrap();
    assert!(product.frozen);
    assert!(!product.sold);
    assert_eq!(product.buyer_id, None);
    assert!(h.publisher.published().is_empty());
}

#[tokio::test]
async fn late_success_recovers_product_closed_unsold() {
    // The cascade exhausts and closes the product, then the capture for the
    // top bid confirms asynchronously after all.
    let h = harness(ScriptedGateway::failing_for(&[10]));
    h.store.seed_product(auction_product(1)).await;

    let bid = h
        .reservation
        .place_bid(&bidder(10), 100, 1)
        .await
        .unwrap();
    expire_product(&h.store, 1).await;

    let outcome = h
        .scheduler
        .settle_product(h.store.find_product(1).await.unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(outcome, SettlementOutcome::ClosedUnsold);

    let body = format!(
        r#"{{"reservationId":"{}"}}"#,
        bid.reservation_id.clone().unwrap()
    );
    h.consumer
        .process(PAYMENT_SUCCESS, body.as_bytes())
        .await
        .unwrap();

    let product = h.store.find_product(1).await.unwrap().unwrap();
    assert!(product.sold);
    assert_eq!(product.buyer_id, Some(10));

    let settled = h
        .store
        .find_by_reservation_id(&bid.reservation_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, BidStatus::Paid);
}

#[tokio::test]
async fn scheduler_losing_the_finalization_race_keeps_payout_and_skips_notifications() {
    let h = harness(ScriptedGateway::default());
    h.store.seed_product(auction_product(1)).await;

    let bid = h
        .reservation
        .place_bid(&bidder(10), 100, 1)
        .await
        .unwrap();
    expire_product(&h.store, 1).await;

    // Snapshot the product as the scheduler would before the consumer runs.
    let stale = h.store.find_product(1).await.unwrap().unwrap();

    // The consumer finalizes first.
    let body = format!(
        r#"{{"reservationId":"{}"}}"#,
        bid.reservation_id.clone().unwrap()
    );
    h.consumer
        .process(PAYMENT_SUCCESS, body.as_bytes())
        .await
        .unwrap();

    // The scheduler then settles from its stale snapshot and loses the
    // compare-and-set to the same buyer.
    let outcome = h.scheduler.settle_product(stale).await.unwrap();
    assert_eq!(outcome, SettlementOutcome::Sold { buyer_id: 10 });

    let product = h.store.find_product(1).await.unwrap().unwrap();
    assert!(product.sold);
    assert_eq!(product.buyer_id, Some(10));

    // Payout still ran exactly once, and the winner notification was not
    // duplicated.
    let calls = h.gateway.calls();
    assert_eq!(
        calls.iter().filter(|c| *c == "deposit:7").count(),
        1
    );
    let winners = h
        .publisher
        .published()
        .iter()
        .filter(|(key, _)| key == AUCTION_WINNER)
        .count();
    assert_eq!(winners, 1);
}
