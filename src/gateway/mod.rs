//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Remote-call seam around the external wallet service.
//
// Every operation is a single HTTP call with no client-side retry. The
// contract is deliberately infallible at the type level: network errors,
// non-2xx responses and unparsable bodies all collapse into `ok == false`
// plus a best-effort human-readable reason, so callers branch on the
// outcome instead of handling transport errors.
//
// | Name                 | Description                                  | Key Methods           |
// |----------------------|----------------------------------------------|-----------------------|
// | PaymentGateway       | Wallet operations seam                       | freeze, deduct,       |
// |                      |                                              | unfreeze, deposit     |
// | FreezeOutcome        | Result of a funds reservation                |                       |
// | GatewayOutcome       | Result of deduct/unfreeze/deposit            |                       |
//--------------------------------------------------------------------------------------------------

use async_trait::async_trait;

pub mod client;

pub use client::HttpPaymentGateway;

/// Result of a `freeze` call: funds reserved against a user's balance.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct FreezeOutcome {
    pub ok: bool,
    /// Opaque reservation id; present when `ok` is true.
    #[serde(default, rename = "reservationId")]
    pub reservation_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of a deduct, unfreeze or deposit call.
#[derive(Debug, Clone, Default)]
pub struct GatewayOutcome {
    pub ok: bool,
    pub reason: Option<String>,
    /// Raw response body on success, when the gateway returned one.
    pub body: Option<serde_json::Value>,
}

impl GatewayOutcome {
    pub fn success(body: Option<serde_json::Value>) -> Self {
        Self {
            ok: true,
            reason: None,
            body,
        }
    }

    pub fn failure(reason: String) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            body: None,
        }
    }
}

/// Wallet operations exposed by the external payment service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Reserves `amount` against the user's balance without capturing it.
    async fn freeze(&self, user_id: i64, amount: i64, email: &str) -> FreezeOutcome;

    /// Captures previously frozen funds, correlated by reservation id.
    async fn deduct(
        &self,
        user_id: i64,
        amount: i64,
        auction_id: i64,
        reservation_id: &str,
        email: &str,
    ) -> GatewayOutcome;

    /// Releases a reservation without capturing funds.
    async fn unfreeze(&self, user_id: i64, amount: i64) -> GatewayOutcome;

    /// Credits funds to a user's balance (seller payout).
    async fn deposit(&self, user_id: i64, amount: i64, source: &str) -> GatewayOutcome;
}
