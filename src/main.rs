//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This is the main entry point for the auction settlement service.
// It wires up the stores, the payment gateway client and the RabbitMQ topic
// exchange, starts the settlement scheduler and the payment event consumer,
// and serves the bidding API.
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use auction_settlement::events::{
    EVENTS_EXCHANGE, PAYMENT_FAILED, PAYMENT_SUCCESS, RabbitNotificationPublisher,
};
use auction_settlement::gateway::{HttpPaymentGateway, PaymentGateway};
use auction_settlement::settlement::{
    AuctionSettlementScheduler, BidReservationService, PaymentEventConsumer,
};
use auction_settlement::storage::memory::MemoryStore;
use auction_settlement::storage::{BidStore, ProductStore};
use auction_settlement::{Api, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (for logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!("Starting auction settlement service");

    let store = Arc::new(MemoryStore::new());
    let products: Arc<dyn ProductStore> = store.clone();
    let bids: Arc<dyn BidStore> = store;

    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(HttpPaymentGateway::new(&config.payment_service_url));

    // One connection to the topic exchange feeds both directions: publishing
    // notifications and consuming payment confirmations.
    let exchange =
        rabbitmq::TopicExchange::connect(&config.rabbit_url, EVENTS_EXCHANGE, &config.app_id)
            .await?;
    let publisher = exchange.publisher().await?;
    let notifier = Arc::new(RabbitNotificationPublisher::new(publisher.get_dispatcher()));

    let subscription = exchange
        .subscribe(&config.payment_queue, &[PAYMENT_SUCCESS, PAYMENT_FAILED])
        .await?;
    let consumer = PaymentEventConsumer::new(products.clone(), bids.clone(), notifier.clone());
    tokio::spawn(async move { consumer.run(subscription).await });

    let scheduler = Arc::new(AuctionSettlementScheduler::new(
        products.clone(),
        bids.clone(),
        gateway.clone(),
        notifier,
        config.settle_interval,
    ));
    let _scheduler_handle = scheduler.start();

    let reservation = Arc::new(BidReservationService::new(
        products.clone(),
        bids.clone(),
        gateway,
    ));
    let api = Api::new(config.bind_addr, reservation, products, bids);
    api.serve().await?;

    Ok(())
}
