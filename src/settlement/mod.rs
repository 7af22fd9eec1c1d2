//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// The bid-settlement saga: reserve funds when a bid is placed, close expired
// auctions by cascading capture attempts across bidders, and reconcile
// asynchronous payment confirmations against pending bids.
//
// | Component                 | Description                                               |
// |---------------------------|-----------------------------------------------------------|
// | BidReservationService     | Synchronous bid placement with funds reservation          |
// | AuctionSettlementScheduler| Periodic batch closing expired auctions (cascade deduct)  |
// | PaymentEventConsumer      | Reconciles payment.success / payment.failed deliveries    |
//
// Both the scheduler and the consumer can try to finalize the same product;
// every finalization goes through the store's versioned compare-and-set so
// exactly one path wins.
//--------------------------------------------------------------------------------------------------

pub mod consumer;
pub mod reservation;
pub mod scheduler;

pub use consumer::{PaymentEventConsumer, ProcessError};
pub use reservation::{BidReservationService, PlaceBidError};
pub use scheduler::{AuctionSettlementScheduler, SettlementOutcome};
