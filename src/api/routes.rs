//--------------------------------------------------------------------------------------------------
// FUNCTIONS
//--------------------------------------------------------------------------------------------------
// | Name                  | Description                            | Return Type         |
// |-----------------------|----------------------------------------|---------------------|
// | health                | Health check endpoint                  | Response            |
// | place_bid             | Place a bid with funds reservation     | ApiResult<Response> |
// | get_product_bids      | List bids on a product                 | ApiResult<Response> |
// | get_my_bids           | List the caller's bids                 | ApiResult<Response> |
// | get_my_summary        | The caller's per-auction outcomes      | ApiResult<Response> |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use super::{ApiError, ApiResult, AppState, BidResponse, BidSummaryEntry, PlaceBidRequest};
use crate::domain::types::RequestContext;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

/// Place a bid with synchronous funds reservation
pub async fn place_bid(
    Extension(state): Extension<Arc<AppState>>,
    ctx: RequestContext,
    Json(req): Json<PlaceBidRequest>,
) -> ApiResult<Response> {
    let (amount, product_id) = req.validated()?;

    info!(
        "Bid request: user_id={} product_id={} amount={}",
        ctx.user_id, product_id, amount
    );
    let bid = state.reservation.place_bid(&ctx, amount, product_id).await?;

    let response = BidResponse::from(bid);
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// List all bids placed on a product
pub async fn get_product_bids(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> ApiResult<Response> {
    if state.products.find_product(product_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Product {} not found",
            product_id
        )));
    }

    let bids = state.bids.find_by_product(product_id).await?;
    let response: Vec<BidResponse> = bids.into_iter().map(BidResponse::from).collect();

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// List the caller's bids
pub async fn get_my_bids(
    Extension(state): Extension<Arc<AppState>>,
    ctx: RequestContext,
) -> ApiResult<Response> {
    let bids = state.bids.find_by_bidder(ctx.user_id).await?;
    let response: Vec<BidResponse> = bids.into_iter().map(BidResponse::from).collect();

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// The caller's per-auction outcomes (won / lost / winning / outbid)
pub async fn get_my_summary(
    Extension(state): Extension<Arc<AppState>>,
    ctx: RequestContext,
) -> ApiResult<Response> {
    let bids = state.bids.find_by_bidder(ctx.user_id).await?;

    let mut entries = Vec::with_capacity(bids.len());
    for bid in &bids {
        // A bid whose product vanished is skipped rather than failing the
        // whole summary.
        if let Some(product) = state.products.find_product(bid.product_id).await? {
            entries.push(BidSummaryEntry::for_bid(bid, &product));
        }
    }

    Ok((StatusCode::OK, Json(entries)).into_response())
}
