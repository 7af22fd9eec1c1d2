// Expose the modules
pub mod api;
pub mod config;
pub mod domain;
pub mod events;
pub mod gateway;
pub mod settlement;
pub mod storage;

// Re-export key types for easier usage
pub use api::Api;
pub use config::Config;
pub use domain::types::{Bid, BidStatus, Product, RequestContext};
pub use events::{
    AUCTION_LOSER, AUCTION_WINNER, AuctionNotification, EVENTS_EXCHANGE, NotificationPublisher,
    PAYMENT_FAILED, PAYMENT_SUCCESS, PaymentEvent, RabbitNotificationPublisher,
};
pub use gateway::{FreezeOutcome, GatewayOutcome, HttpPaymentGateway, PaymentGateway};
pub use settlement::{
    AuctionSettlementScheduler, BidReservationService, PaymentEventConsumer, PlaceBidError,
    ProcessError, SettlementOutcome,
};
pub use storage::{BidStore, ProductStore, StorageError, StorageResult, memory::MemoryStore};
