use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use super::{FreezeOutcome, GatewayOutcome, PaymentGateway};

/// HTTP client for the external wallet service.
///
/// POSTs to `/wallet/{freeze,deduct,unfreeze,deposit}` and never raises to
/// its caller: every failure mode becomes `ok == false` with a reason.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    /// HTTP client
    client: Client,

    /// Base URL for the payment service
    base_url: String,
}

impl HttpPaymentGateway {
    /// Creates a new gateway client.
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    /// Performs one wallet POST and folds the response into a GatewayOutcome.
    async fn post_wallet(&self, operation: &str, body: serde_json::Value) -> GatewayOutcome {
        let url = format!("{}/wallet/{}", self.base_url, operation);

        let resp = match self.client.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!("wallet {} call failed: {}", operation, err);
                return GatewayOutcome::failure(err.to_string());
            }
        };

        let status = resp.status();
        if status.is_success() {
            let body = resp.json::<serde_json::Value>().await.ok();
            return GatewayOutcome::success(body);
        }

        let text = resp.text().await.unwrap_or_default();
        GatewayOutcome::failure(extract_reason(status, &text))
    }
}

/// Pulls a clean reason out of an error body.
///
/// Prefers `{reason}`, then `{message}`, then the raw body, and falls back
/// to the HTTP status when the body is empty.
fn extract_reason(status: reqwest::StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(node) => {
            if let Some(reason) = node.get("reason").and_then(|v| v.as_str()) {
                reason.to_string()
            } else if let Some(message) = node.get("message").and_then(|v| v.as_str()) {
                message.to_string()
            } else {
                body.to_string()
            }
        }
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn freeze(&self, user_id: i64, amount: i64, email: &str) -> FreezeOutcome {
        let url = format!("{}/wallet/freeze", self.base_url);
        let body = json!({
            "userId": user_id.to_string(),
            "amount": amount,
            "email": email,
        });

        let resp = match self.client.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!("wallet freeze call failed: {}", err);
                return FreezeOutcome {
                    ok: false,
                    reservation_id: None,
                    reason: Some(err.to_string()),
                };
            }
        };

        let status = resp.status();
        if status.is_success() {
            return match resp.json::<FreezeOutcome>().await {
                Ok(outcome) => outcome,
                Err(err) => FreezeOutcome {
                    ok: false,
                    reservation_id: None,
                    reason: Some(err.to_string()),
                },
            };
        }

        let text = resp.text().await.unwrap_or_default();
        FreezeOutcome {
            ok: false,
            reservation_id: None,
            reason: Some(extract_reason(status, &text)),
        }
    }

    async fn deduct(
        &self,
        user_id: i64,
        amount: i64,
        auction_id: i64,
        reservation_id: &str,
        email: &str,
    ) -> GatewayOutcome {
        self.post_wallet(
            "deduct",
            json!({
                "userId": user_id.to_string(),
                "amount": amount,
                "auctionId": auction_id,
                "reservationId": reservation_id,
                "email": email,
            }),
        )
        .await
    }

    async fn unfreeze(&self, user_id: i64, amount: i64) -> GatewayOutcome {
        self.post_wallet(
            "unfreeze",
            json!({
                "userId": user_id.to_string(),
                "amount": amount,
            }),
        )
        .await
    }

    async fn deposit(&self, user_id: i64, amount: i64, source: &str) -> GatewayOutcome {
        self.post_wallet(
            "deposit",
            json!({
                "userId": user_id.to_string(),
                "amount": amount,
                "source": source,
            }),
        )
        .await
    }
}
