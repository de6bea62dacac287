use crate::{
    entities::{cart, cart_item, Cart, CartItem},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::CatalogService,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Carts live this long from creation; reads past the deadline see a fresh
/// empty cart and the sweep deletes the row.
const CART_TTL_DAYS: i64 = 7;

/// Cart with its items and the subtotal computed at read time.
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

impl CartWithItems {
    pub fn subtotal(&self) -> Decimal {
        subtotal(&self.items)
    }
}

/// Sum of `unit_price × quantity` over the items, at the prices captured when
/// each line was added.
pub fn subtotal(items: &[cart_item::Model]) -> Decimal {
    items.iter().map(cart_item::Model::line_total).sum()
}

/// Session-scoped shopping cart store.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    catalog: Arc<CatalogService>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: Arc<CatalogService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
        }
    }

    /// Returns the live cart for a session, creating an empty one when none
    /// exists or the existing one has expired. Absence is a valid empty
    /// state, never an error.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, session_token: &str) -> Result<CartWithItems, ServiceError> {
        let now = Utc::now();

        let existing = Cart::find()
            .filter(cart::Column::SessionToken.eq(session_token))
            .one(&*self.db)
            .await?;

        let cart = match existing {
            Some(cart) if !cart.is_expired(now) => cart,
            Some(stale) => {
                // Same token, fresh identity: drop the stale cart in place of
                // waiting for the sweep, since the token is unique.
                let txn = self.db.begin().await?;
                CartItem::delete_many()
                    .filter(cart_item::Column::CartId.eq(stale.id))
                    .exec(&txn)
                    .await?;
                Cart::delete_by_id(stale.id).exec(&txn).await?;
                let fresh = self.insert_cart(&txn, session_token).await?;
                txn.commit().await?;
                fresh
            }
            None => {
                let fresh = self.insert_cart(&*self.db, session_token).await?;
                fresh
            }
        };

        let items = self.items_of(cart.id).await?;
        Ok(CartWithItems { cart, items })
    }

    /// Adds an item to the cart, or increments the quantity when the same
    /// (product, variant) line already exists. The unit price is resolved
    /// from the catalog here and frozen on the line.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        session_token: &str,
        input: AddItemInput,
    ) -> Result<CartWithItems, ServiceError> {
        // Quantity below one is a client quirk, not an error
        let quantity = input.quantity.max(1);

        let unit_price = self
            .catalog
            .unit_price(input.product_id, input.variant_id)
            .await?;

        let cart = self.get_or_create(session_token).await?.cart;

        let txn = self.db.begin().await?;

        let mut existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id));
        existing = match input.variant_id {
            Some(variant_id) => existing.filter(cart_item::Column::VariantId.eq(variant_id)),
            None => existing.filter(cart_item::Column::VariantId.is_null()),
        };

        if let Some(item) = existing.one(&txn).await? {
            let current_quantity = item.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(current_quantity + quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                variant_id: Set(input.variant_id),
                quantity: Set(quantity),
                unit_price: Set(unit_price),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        self.touch(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        info!(
            cart_id = %cart.id,
            product_id = %input.product_id,
            quantity = quantity,
            "Added item to cart"
        );
        self.cart_with_items(cart.id).await
    }

    /// Updates a line's quantity. Zero or below removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart_id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this cart".to_string(),
            ));
        }

        if quantity <= 0 {
            CartItem::delete_by_id(item_id).exec(&txn).await?;
        } else {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        self.touch(&txn, cart_id).await?;
        txn.commit().await?;

        let event = if quantity <= 0 {
            Event::CartItemRemoved { cart_id, item_id }
        } else {
            Event::CartItemUpdated { cart_id, item_id }
        };
        self.event_sender.send_or_log(event).await;

        self.cart_with_items(cart_id).await
    }

    /// Removes a line outright.
    pub async fn remove_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        self.update_item_quantity(cart_id, item_id, 0).await
    }

    /// Loads a cart with items, by id.
    pub async fn cart_with_items(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let items = self.items_of(cart_id).await?;
        Ok(CartWithItems { cart, items })
    }

    /// Deletes carts (and their items) whose expiration has passed. Run
    /// periodically from the server binary.
    #[instrument(skip(self))]
    pub async fn cleanup_expired_carts(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();

        let expired = Cart::find()
            .filter(cart::Column::ExpiresAt.lte(now))
            .all(&*self.db)
            .await?;

        if expired.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = expired.iter().map(|c| c.id).collect();

        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        let deleted = Cart::delete_many()
            .filter(cart::Column::Id.is_in(ids))
            .exec(&txn)
            .await?
            .rows_affected;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartsSwept { deleted })
            .await;

        info!(deleted = deleted, "Swept expired carts");
        Ok(deleted)
    }

    async fn insert_cart(
        &self,
        conn: &impl ConnectionTrait,
        session_token: &str,
    ) -> Result<cart::Model, ServiceError> {
        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_token: Set(session_token.to_string()),
            expires_at: Set(now + Duration::days(CART_TTL_DAYS)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let cart = cart.insert(conn).await?;
        self.event_sender
            .send_or_log(Event::CartCreated(cart.id))
            .await;
        info!(cart_id = %cart.id, "Created cart");
        Ok(cart)
    }

    async fn items_of(&self, cart_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(Into::into)
    }

    async fn touch(
        &self,
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        let mut cart: cart::ActiveModel = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?
            .into();
        cart.updated_at = Set(Utc::now());
        cart.update(conn).await?;
        Ok(())
    }
}

/// Input for adding an item to the cart
#[derive(Debug, Clone, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(unit_price: Decimal, quantity: i32) -> cart_item::Model {
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
    fn subtotal_is_sum_of_captured_prices() {
        let items = vec![item(dec!(10.00), 2), item(dec!(5.00), 1)];
        assert_eq!(subtotal(&items), dec!(25.00));
    }

    #[test]
    fn subtotal_of_empty_cart_is_zero() {
        assert_eq!(subtotal(&[]), Decimal::ZERO);
    }

    #[test]
    fn subtotal_keeps_cent_precision() {
        let items = vec![item(dec!(19.99), 7), item(dec!(0.01), 100)];
        assert_eq!(subtotal(&items), dec!(140.93));
    }

    #[test]
    fn line_total_multiplies_captured_price() {
        let line = item(dec!(25.50), 3);
        assert_eq!(line.line_total(), dec!(76.50));
    }

    #[test]
    fn cart_expiry_window_is_seven_days() {
        let now = Utc::now();
        let cart = cart::Model {
            id: Uuid::new_v4(),
            session_token: "tok".into(),
            expires_at: now + Duration::days(CART_TTL_DAYS),
            created_at: now,
            updated_at: now,
        };

        assert!(!cart.is_expired(now));
        assert!(!cart.is_expired(now + Duration::days(6)));
        assert!(cart.is_expired(now + Duration::days(7)));
    }
}
