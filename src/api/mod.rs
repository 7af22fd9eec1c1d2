//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// REST API for bid placement and bid queries, implemented with Axum.
//
// Authentication is delegated to the edge gateway: it verifies the caller
// and forwards the identity as `x-user-id` / `x-user-email` / `x-user-role`
// headers, which the RequestContext extractor turns into a typed principal.
//
// | Component      | Description                                                |
// |----------------|-----------------------------------------------------------|
// | AppState       | Shared application state                                   |
// | Api            | Main API structure coordinating routes                     |
// | Routes         | Handler functions for API endpoints                        |
// | DTOs           | Data transfer objects for API requests/responses           |
//--------------------------------------------------------------------------------------------------

mod dto;
mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Router, async_trait,
    extract::FromRequestParts,
    http::{HeaderValue, Method, header, request::Parts},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domain::types::RequestContext;
use crate::settlement::BidReservationService;
use crate::storage::{BidStore, ProductStore};

pub use dto::*;
pub use error::{ApiError, ApiResult};

/// Shared application state accessible by all handlers
pub struct AppState {
    /// Bid placement service
    pub reservation: Arc<BidReservationService>,
    /// Product persistence
    pub products: Arc<dyn ProductStore>,
    /// Bid persistence
    pub bids: Arc<dyn BidStore>,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };

        let user_id = header_str("x-user-id")
            .and_then(|raw| raw.parse::<i64>().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing or invalid x-user-id".to_string()))?;
        let email = header_str("x-user-email")
            .ok_or_else(|| ApiError::Unauthorized("missing x-user-email".to_string()))?;
        let role = header_str("x-user-role").unwrap_or_else(|| "user".to_string());

        Ok(RequestContext {
            user_id,
            email,
            role,
        })
    }
}

/// Main API structure
pub struct Api {
    /// API address
    addr: SocketAddr,
    /// Shared application state
    state: Arc<AppState>,
}

impl Api {
    /// Creates a new API instance
    pub fn new(
        addr: SocketAddr,
        reservation: Arc<BidReservationService>,
        products: Arc<dyn ProductStore>,
        bids: Arc<dyn BidStore>,
    ) -> Self {
        let state = Arc::new(AppState {
            reservation,
            products,
            bids,
        });
        Self { addr, state }
    }

    /// Creates all routes for the API
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin([
                "http://localhost:3000".parse::<HeaderValue>().unwrap(),
                "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
            ])
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

        Router::new()
            // Health check
            .route("/health", get(routes::health))
            // Bid placement
            .route("/bids", post(routes::place_bid))
            // Bid queries
            .route("/bids/product/:id", get(routes::get_product_bids))
            .route("/bids/me", get(routes::get_my_bids))
            .route("/bids/me/summary", get(routes::get_my_summary))
            // Attach application state
            .layer(Extension(self.state.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Starts the API server and runs until shutdown
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.routes();

        info!("API listening on {}", self.addr);
        let listener = TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
