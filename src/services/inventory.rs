use crate::{
    entities::{product, product_variant, Product, ProductVariant},
    errors::ServiceError,
};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// The stock row a reservation decrements: a product sold without variants,
/// or one of its variants. Never both for the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationTarget {
    Product(Uuid),
    Variant(Uuid),
}

/// Inventory ledger.
///
/// Reservation is a single conditional decrement; the row count it reports is
/// the only success signal. There is deliberately no read-then-compare here:
/// that pattern reintroduces the oversell race this service exists to close.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Reserves `quantity` units against the service's own connection.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        target: ReservationTarget,
        quantity: i32,
        sku: &str,
    ) -> Result<(), ServiceError> {
        self.reserve_in(&*self.db, target, quantity, sku).await
    }

    /// Reserves `quantity` units on the given connection, so the order
    /// engine can run the whole reservation set inside one transaction.
    ///
    /// A missing row and an insufficient one are indistinguishable (zero rows
    /// affected either way) and are reported identically.
    pub async fn reserve_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        target: ReservationTarget,
        quantity: i32,
        sku: &str,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "Reservation quantity must be positive, got {}",
                quantity
            )));
        }

        let rows_affected = match target {
            ReservationTarget::Product(product_id) => {
                Product::update_many()
                    .col_expr(
                        product::Column::InventoryQuantity,
                        Expr::col(product::Column::InventoryQuantity).sub(quantity),
                    )
                    .filter(product::Column::Id.eq(product_id))
                    .filter(product::Column::InventoryQuantity.gte(quantity))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
            ReservationTarget::Variant(variant_id) => {
                ProductVariant::update_many()
                    .col_expr(
                        product_variant::Column::InventoryQuantity,
                        Expr::col(product_variant::Column::InventoryQuantity).sub(quantity),
                    )
                    .filter(product_variant::Column::Id.eq(variant_id))
                    .filter(product_variant::Column::InventoryQuantity.gte(quantity))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
        };

        if rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient stock for SKU {}",
                sku
            )));
        }

        info!(sku = %sku, quantity = quantity, "Reserved inventory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_compare_by_row_identity() {
        let id = Uuid::new_v4();
        assert_eq!(ReservationTarget::Product(id), ReservationTarget::Product(id));
        assert_ne!(ReservationTarget::Product(id), ReservationTarget::Variant(id));
    }
}
