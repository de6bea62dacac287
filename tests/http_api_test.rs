mod common;

use axum::body::Body;
use common::{app_state, seed_product};
use http::{header, Request, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}


/// Money fields serialize as JSON strings; compare them as decimals so the
/// backend's scale choices don't matter.
fn dec_field(value: &Value, key: &str) -> Decimal {
    match &value[key] {
        Value::String(s) => s.parse().expect("decimal field"),
        Value::Number(n) => n.to_string().parse().expect("decimal field"),
        other => panic!("field {} is not a number: {:?}", key, other),
    }
}

fn cookie_of(response: &axum::response::Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

#[tokio::test]
async fn get_cart_returns_an_empty_shape_and_a_session() {
    let state = app_state().await;
    let app = storefront_api::app_router().with_state(state);

    let response = app
        .oneshot(Request::builder().uri("/cart").body(Body::empty()).unwrap())
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = cookie_of(&response).expect("session issued");
    assert!(cookie.starts_with("sf_session="));

    let body = body_json(response).await;
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["item_count"], 0);
}

#[tokio::test]
async fn cart_add_checkout_and_lookup_round_trip() {
    let state = app_state().await;
    let product = seed_product(&state.services, "HTTP-SKU", dec!(10.00), 5).await;
    let app = storefront_api::app_router().with_state(state);

    // Add to a fresh session; keep the cookie the server set
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cart/add")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"product_id": product.id, "quantity": 2}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = cookie_of(&response).expect("session issued");
    let body = body_json(response).await;
    assert_eq!(body["item_count"], 2);
    assert_eq!(dec_field(&body, "subtotal"), dec!(20.00));

    // Checkout against the same session
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, cookie.clone())
                .body(Body::from(
                    json!({
                        "email": "jane@example.com",
                        "shipping_address": {
                            "first_name": "Jane",
                            "last_name": "Doe",
                            "address_line_1": "1 Main St",
                            "city": "Springfield",
                            "province": "IL",
                            "country_code": "US",
                            "postal_code": "62704"
                        }
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    // Success clears the session cookie
    let cleared = cookie_of(&response).expect("cookie cleared");
    assert_eq!(cleared, "sf_session=");

    let order = body_json(response).await;
    assert_eq!(dec_field(&order, "subtotal"), dec!(20.00));
    assert_eq!(dec_field(&order, "tax"), dec!(1.60));
    assert_eq!(dec_field(&order, "shipping_cost"), dec!(3.00));
    assert_eq!(dec_field(&order, "total"), dec!(24.60));
    let order_number = order["order_number"].as_str().expect("number").to_string();

    // Public lookup by order number
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/order/{}", order_number))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["order_number"], json!(order_number));
    assert_eq!(fetched["items"].as_array().map(Vec::len), Some(1));

    // Unknown orders are a 404 with a stable code
    let response = app
        .oneshot(
            Request::builder()
                .uri("/order/ORD-19700101000000-0000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err = body_json(response).await;
    assert_eq!(err["code"], json!("not_found"));
}

#[tokio::test]
async fn checkout_without_a_cart_is_a_400_empty_cart() {
    let state = app_state().await;
    let app = storefront_api::app_router().with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "email": "jane@example.com",
                        "shipping_address": {
                            "first_name": "Jane",
                            "last_name": "Doe",
                            "address_line_1": "1 Main St",
                            "city": "Springfield",
                            "province": "IL",
                            "country_code": "US",
                            "postal_code": "62704"
                        }
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err = body_json(response).await;
    assert_eq!(err["code"], json!("empty_cart"));
}

#[tokio::test]
async fn insufficient_stock_surfaces_the_sku_over_http() {
    let state = app_state().await;
    let product = seed_product(&state.services, "SCARCE", dec!(10.00), 1).await;
    let app = storefront_api::app_router().with_state(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cart/add")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"product_id": product.id, "quantity": 2}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .expect("response");
    let cookie = cookie_of(&response).expect("session");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, cookie)
                .body(Body::from(
                    json!({
                        "email": "jane@example.com",
                        "shipping_address": {
                            "first_name": "Jane",
                            "last_name": "Doe",
                            "address_line_1": "1 Main St",
                            "city": "Springfield",
                            "province": "IL",
                            "country_code": "US",
                            "postal_code": "62704"
                        }
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err = body_json(response).await;
    assert_eq!(err["code"], json!("insufficient_stock"));
    assert!(err["message"].as_str().unwrap().contains("SCARCE"));
}

#[tokio::test]
async fn health_endpoint_reports_the_store() {
    let state = app_state().await;
    let app = storefront_api::app_router().with_state(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("ok"));
}
