use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "storefront-api",
        description = "Order and checkout engine for a multi-tenant storefront",
    ),
    paths(
        crate::handlers::checkout::checkout,
        crate::handlers::checkout::create_payment_intent,
        crate::handlers::orders::get_order,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(schemas(
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::Address,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderItemResponse,
        crate::handlers::checkout::PaymentIntentRequest,
        crate::handlers::checkout::PaymentIntentResponse,
        crate::errors::ErrorResponse,
    )),
    tags(
        (name = "Checkout", description = "Cart-to-order conversion and payment intents"),
        (name = "Orders", description = "Order lookup and fulfillment"),
        (name = "Payments", description = "Inbound payment-provider webhooks"),
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at /docs, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
