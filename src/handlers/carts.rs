use crate::{
    entities::cart_item,
    errors::ServiceError,
    handlers::{
        common::success_response_with_cookie,
        session::{ensure_session, session_token},
    },
    services::cart::{AddItemInput, CartWithItems},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/add", post(add_to_cart))
        .route("/cart/update/:item_id", post(update_cart_item))
        .route("/cart/remove/:item_id", post(remove_cart_item))
}

/// Current cart for the session, created on first sight
async fn get_cart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let (token, cookie) = ensure_session(&headers);
    let cart = state.services.cart.get_or_create(&token).await?;

    Ok(success_response_with_cookie(CartResponse::from(cart), cookie))
}

/// Add an item; an existing (product, variant) line gains quantity instead
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let (token, cookie) = ensure_session(&headers);

    let cart = state
        .services
        .cart
        .add_item(
            &token,
            AddItemInput {
                product_id: payload.product_id,
                variant_id: payload.variant_id,
                quantity: payload.quantity,
            },
        )
        .await?;

    Ok(success_response_with_cookie(CartResponse::from(cart), cookie))
}

/// Update a line's quantity; zero or below removes it
async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = cart_for_session(&state, &headers).await?;
    let updated = state
        .services
        .cart
        .update_item_quantity(cart.cart.id, item_id, payload.quantity)
        .await?;

    Ok(success_response_with_cookie(CartResponse::from(updated), None))
}

/// Remove a line
async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = cart_for_session(&state, &headers).await?;
    let updated = state
        .services
        .cart
        .remove_item(cart.cart.id, item_id)
        .await?;

    Ok(success_response_with_cookie(CartResponse::from(updated), None))
}

async fn cart_for_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<CartWithItems, ServiceError> {
    let token = session_token(headers)
        .ok_or_else(|| ServiceError::NotFound("No active cart session".to_string()))?;
    state.services.cart.get_or_create(&token).await
}

// Request/response DTOs

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Zero or negative quantity removes the line, per the update contract.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub id: Uuid,
    pub items: Vec<CartItemResponse>,
    pub subtotal: Decimal,
    pub item_count: i32,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&cart_item::Model> for CartItemResponse {
    fn from(item: &cart_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total(),
        }
    }
}

impl From<CartWithItems> for CartResponse {
    fn from(cart: CartWithItems) -> Self {
        let subtotal = cart.subtotal();
        let item_count = cart.items.iter().map(|i| i.quantity).sum();
        Self {
            id: cart.cart.id,
            items: cart.items.iter().map(CartItemResponse::from).collect(),
            subtotal,
            item_count,
            expires_at: cart.cart.expires_at,
            updated_at: cart.cart.updated_at,
        }
    }
}
