use crate::{
    entities::{
        cart, cart_item, order, order_item,
        order::{FulfillmentStatus, PaymentStatus},
        Cart, CartItem, Order, OrderItem, Product, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::subtotal,
        customers::CustomerService,
        inventory::{InventoryService, ReservationTarget},
    },
    sites::SiteConfig,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// Shipping address captured with the order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct Address {
    #[validate(length(min = 1, message = "first_name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last_name is required"))]
    pub last_name: String,
    pub company: Option<String>,
    #[validate(length(min = 1, message = "address_line_1 is required"))]
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "province is required"))]
    pub province: String,
    #[validate(length(equal = 2, message = "country_code must be 2 characters"))]
    pub country_code: String,
    #[validate(length(min = 1, message = "postal_code is required"))]
    pub postal_code: String,
    pub phone: Option<String>,
}

/// Checkout request body. Typed and validated up front; nothing is mutated
/// until every field has been checked.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate]
    pub shipping_address: Address,
    /// Payment-intent reference from POST /payment-intent, when the client
    /// created one before checking out
    pub payment_intent_id: Option<String>,
}

/// Frozen money snapshot computed at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingBreakdown {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl PricingBreakdown {
    /// Total in the currency's minor units, for the payment provider.
    pub fn total_minor_units(&self) -> Result<i64, ServiceError> {
        (self.total * dec!(100))
            .round_dp(0)
            .to_i64()
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("Total {} out of range", self.total))
            })
    }
}

/// Prices a set of cart lines under a site's tax and shipping settings.
///
/// An unconfigured rate prices as zero but is logged, since unset and a
/// deliberate zero are different situations for the operator.
pub fn price_items(items: &[cart_item::Model], site: &SiteConfig) -> PricingBreakdown {
    let subtotal = subtotal(items);

    let tax_rate = match site.tax_rate {
        Some(rate) => rate,
        None => {
            tracing::debug!(site = %site.key, "Tax rate not configured, pricing as zero");
            Decimal::ZERO
        }
    };
    let tax = (subtotal * tax_rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    let shipping = match site.shipping_cost {
        Some(cost) => cost,
        None => {
            tracing::debug!(site = %site.key, "Shipping cost not configured, pricing as zero");
            Decimal::ZERO
        }
    };

    let total = subtotal + tax + shipping;

    PricingBreakdown {
        subtotal,
        tax,
        shipping,
        total,
    }
}

/// Generates a human-readable order number from the creation timestamp.
/// Uniqueness is enforced by the index on `orders.order_number`; the random
/// suffix keeps same-second checkouts apart.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("ORD-{}-{:04}", now.format("%Y%m%d%H%M%S"), suffix)
}

/// An order with its items, as committed.
#[derive(Debug, Serialize)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// The order engine: the single entry point that converts a cart into a
/// persisted order.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    customers: Arc<CustomerService>,
    inventory: Arc<InventoryService>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        customers: Arc<CustomerService>,
        inventory: Arc<InventoryService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            customers,
            inventory,
        }
    }

    /// Converts the session's cart into an order.
    ///
    /// Order row, item rows and every line's inventory reservation commit as
    /// one unit of work: a line that cannot be reserved rolls the whole order
    /// back, so no order ever exists whose items were not actually reserved.
    /// The returned order is re-read from the store after commit; the
    /// response is what was persisted, not what was computed.
    #[instrument(skip(self, request), fields(site = %site.key, email = %request.email))]
    pub async fn create_from_cart(
        &self,
        site: &SiteConfig,
        session_token: &str,
        request: CreateOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::InvalidOrderRequest(e.to_string()))?;

        let now = Utc::now();
        let cart = Cart::find()
            .filter(cart::Column::SessionToken.eq(session_token))
            .one(&*self.db)
            .await?
            .filter(|c| !c.is_expired(now))
            .ok_or(ServiceError::EmptyCart)?;

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let pricing = price_items(&items, site);

        // Supplementary enrichment: a registry failure must never block the
        // order, so it degrades to a null customer reference.
        let customer_id = match self
            .customers
            .get_or_create(
                &request.email,
                &request.shipping_address.first_name,
                &request.shipping_address.last_name,
            )
            .await
        {
            Ok(customer) => Some(customer.id),
            Err(e) => {
                warn!("Customer resolution failed, proceeding without: {}", e);
                None
            }
        };

        let shipping_address = serde_json::to_string(&request.shipping_address)
            .map_err(|e| ServiceError::InternalError(format!("Address serialization: {}", e)))?;

        let mut attempt = 0;
        let order_id = loop {
            attempt += 1;
            let order_number = generate_order_number(Utc::now());

            match self
                .persist_order(
                    site,
                    &order_number,
                    customer_id,
                    &request,
                    &shipping_address,
                    &items,
                    &pricing,
                )
                .await
            {
                Ok(order_id) => break order_id,
                Err(ServiceError::DatabaseError(db_err))
                    if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
                        && attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    warn!(order_number = %order_number, "Order number collision, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        let details = self.get_by_id(order_id).await?;
        info!(
            order_number = %details.order.order_number,
            total = %details.order.total,
            "Order created"
        );
        Ok(details)
    }

    /// One atomic unit of work: order row, item rows, then the reservation
    /// set. Any error drops the transaction and rolls everything back.
    #[allow(clippy::too_many_arguments)]
    async fn persist_order(
        &self,
        site: &SiteConfig,
        order_number: &str,
        customer_id: Option<Uuid>,
        request: &CreateOrderRequest,
        shipping_address: &str,
        items: &[cart_item::Model],
        pricing: &PricingBreakdown,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.to_string()),
            site: Set(site.key.clone()),
            customer_id: Set(customer_id),
            email: Set(request.email.trim().to_lowercase()),
            currency: Set(site.currency.clone()),
            subtotal: Set(pricing.subtotal),
            tax: Set(pricing.tax),
            shipping_cost: Set(pricing.shipping),
            total: Set(pricing.total),
            payment_status: Set(PaymentStatus::Pending),
            fulfillment_status: Set(FulfillmentStatus::Unfulfilled),
            payment_intent_id: Set(request.payment_intent_id.clone()),
            shipping_address: Set(shipping_address.to_string()),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        // Denormalize names and SKUs from the catalog as it stands right now,
        // then reserve each line. A product row that has vanished since the
        // item was added reads the same as zero stock.
        let mut reservations: Vec<(ReservationTarget, i32, String)> =
            Vec::with_capacity(items.len());

        for (position, item) in items.iter().enumerate() {
            let product = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::InsufficientStock(format!(
                        "Insufficient stock for product {}",
                        item.product_id
                    ))
                })?;

            let (sku, variant_title, target) = match item.variant_id {
                Some(variant_id) => {
                    let variant = ProductVariant::find_by_id(variant_id)
                        .one(&txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::InsufficientStock(format!(
                                "Insufficient stock for variant {}",
                                variant_id
                            ))
                        })?;
                    (
                        variant.sku.clone(),
                        Some(variant.title.clone()),
                        ReservationTarget::Variant(variant_id),
                    )
                }
                None => (
                    product.sku.clone(),
                    None,
                    ReservationTarget::Product(item.product_id),
                ),
            };

            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                sku: Set(sku.clone()),
                product_name: Set(product.name.clone()),
                variant_title: Set(variant_title),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total_price: Set(item.line_total()),
                position: Set(position as i32),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;

            reservations.push((target, item.quantity, sku));
        }

        for (target, quantity, sku) in &reservations {
            self.inventory
                .reserve_in(&txn, *target, *quantity, sku)
                .await?;
        }

        txn.commit().await?;

        for (_, quantity, sku) in reservations {
            self.event_sender
                .send_or_log(Event::InventoryReserved {
                    order_id,
                    sku,
                    quantity,
                })
                .await;
        }

        Ok(order_id)
    }

    pub async fn get_by_id(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = self.items_of(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    pub async fn get_by_number(&self, order_number: &str) -> Result<OrderDetails, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", order_number))
            })?;

        let items = self.items_of(order.id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Updates the mutable fulfillment fields; everything else on the order
    /// stays frozen.
    #[instrument(skip(self))]
    pub async fn update_fulfillment(
        &self,
        order_number: &str,
        status: FulfillmentStatus,
        tracking_number: Option<String>,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", order_number))
            })?;

        let order_id = order.id;
        let mut active: order::ActiveModel = order.into();
        active.fulfillment_status = Set(status);
        if let Some(tracking) = tracking_number {
            active.tracking_number = Set(Some(tracking));
        }
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderFulfillmentUpdated { order_id })
            .await;

        self.get_by_id(order_id).await
    }

    async fn items_of(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await
            .map_err(Into::into)
    }
}

/// Order response DTO
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub site: String,
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub payment_status: String,
    pub fulfillment_status: String,
    pub payment_intent_id: Option<String>,
    pub shipping_address: Option<Address>,
    pub tracking_number: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

/// Order item response DTO
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub product_name: String,
    pub variant_title: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        let OrderDetails { order, items } = details;
        Self {
            id: order.id,
            order_number: order.order_number,
            site: order.site,
            customer_id: order.customer_id,
            email: order.email,
            currency: order.currency,
            subtotal: order.subtotal,
            tax: order.tax,
            shipping_cost: order.shipping_cost,
            total: order.total,
            payment_status: order.payment_status.as_str().to_string(),
            fulfillment_status: order.fulfillment_status.as_str().to_string(),
            payment_intent_id: order.payment_intent_id,
            shipping_address: serde_json::from_str(&order.shipping_address).ok(),
            tracking_number: order.tracking_number,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: item.id,
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    sku: item.sku,
                    product_name: item.product_name,
                    variant_title: item.variant_title,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::SiteConfig;

    fn site(tax_rate: Option<Decimal>, shipping: Option<Decimal>) -> SiteConfig {
        SiteConfig {
            key: "default".into(),
            name: "Test".into(),
            currency: "USD".into(),
            tax_rate,
            shipping_cost: shipping,
        }
    }

    fn line(unit_price: Decimal, quantity: i32) -> cart_item::Model {
        cart_item::Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            variant_id: None,
            quantity,
            unit_price,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn prices_the_reference_cart() {
        // Two of A at 10.00 plus one of B at 5.00, 8% tax, flat 3.00 shipping
        let items = vec![line(dec!(10.00), 2), line(dec!(5.00), 1)];
        let pricing = price_items(&items, &site(Some(dec!(0.08)), Some(dec!(3.00))));

        assert_eq!(pricing.subtotal, dec!(25.00));
        assert_eq!(pricing.tax, dec!(2.00));
        assert_eq!(pricing.shipping, dec!(3.00));
        assert_eq!(pricing.total, dec!(30.00));
    }

    #[test]
    fn total_invariant_holds_exactly() {
        let items = vec![line(dec!(19.99), 3), line(dec!(0.01), 7)];
        let pricing = price_items(&items, &site(Some(dec!(0.0875)), Some(dec!(4.90))));

        assert_eq!(
            pricing.total,
            pricing.subtotal + pricing.tax + pricing.shipping
        );
    }

    #[test]
    fn unset_and_zero_rates_both_price_as_zero() {
        let items = vec![line(dec!(10.00), 1)];

        let unset = price_items(&items, &site(None, None));
        let zero = price_items(&items, &site(Some(Decimal::ZERO), Some(Decimal::ZERO)));

        assert_eq!(unset.tax, Decimal::ZERO);
        assert_eq!(unset.shipping, Decimal::ZERO);
        assert_eq!(unset.total, zero.total);
    }

    #[test]
    fn tax_rounds_to_cents() {
        // 9.99 * 0.0825 = 0.824175 -> 0.82
        let items = vec![line(dec!(9.99), 1)];
        let pricing = price_items(&items, &site(Some(dec!(0.0825)), None));

        assert_eq!(pricing.tax, dec!(0.82));
        assert_eq!(pricing.total, dec!(10.81));
    }

    #[test]
    fn minor_units_conversion() {
        let items = vec![line(dec!(10.00), 2), line(dec!(5.00), 1)];
        let pricing = price_items(&items, &site(Some(dec!(0.08)), Some(dec!(3.00))));

        assert_eq!(pricing.total_minor_units().unwrap(), 3000);
    }

    #[test]
    fn order_numbers_are_timestamp_derived() {
        let now = Utc::now();
        let number = generate_order_number(now);

        let expected_prefix = format!("ORD-{}", now.format("%Y%m%d%H%M%S"));
        assert!(number.starts_with(&expected_prefix));
        assert_eq!(number.len(), expected_prefix.len() + 5);
    }

    #[test]
    fn invalid_address_is_rejected_before_any_mutation() {
        let request = CreateOrderRequest {
            email: "not-an-email".into(),
            shipping_address: Address {
                first_name: "".into(),
                last_name: "Doe".into(),
                company: None,
                address_line_1: "1 Main St".into(),
                address_line_2: None,
                city: "Springfield".into(),
                province: "IL".into(),
                country_code: "USA".into(),
                postal_code: "62704".into(),
                phone: None,
            },
            payment_intent_id: None,
        };

        let err = request.validate().unwrap_err().to_string();
        assert!(err.contains("email"));
        assert!(err.contains("first_name"));
        assert!(err.contains("country_code"));
    }
}
