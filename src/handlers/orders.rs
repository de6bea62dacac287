use crate::{
    entities::order::FulfillmentStatus,
    errors::ServiceError,
    handlers::common::success_response,
    services::orders::OrderResponse,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/order/:order_number", get(get_order))
        .route("/order/:order_number/fulfillment", post(update_fulfillment))
}

/// Fetch an order with its items by order number
#[utoipa::path(
    get,
    path = "/order/{order_number}",
    params(("order_number" = String, Path, description = "Human-readable order number")),
    responses(
        (status = 200, description = "Order with items", body = OrderResponse),
        (status = 404, description = "No such order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state.services.orders.get_by_number(&order_number).await?;
    Ok(success_response(OrderResponse::from(details)))
}

/// Update the mutable fulfillment fields of an order
async fn update_fulfillment(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
    Json(payload): Json<FulfillmentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = FulfillmentStatus::from_str(&payload.fulfillment_status).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Unknown fulfillment status: {}",
            payload.fulfillment_status
        ))
    })?;

    let details = state
        .services
        .orders
        .update_fulfillment(&order_number, status, payload.tracking_number)
        .await?;

    Ok(success_response(OrderResponse::from(details)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FulfillmentRequest {
    pub fulfillment_status: String,
    pub tracking_number: Option<String>,
}
