use crate::{
    entities::{product, product_variant, Product, ProductVariant},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Catalog lookups consumed by the cart and order engine.
///
/// Prices are resolved here exactly once per cart line, at add time; checkout
/// never re-queries them.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a product.
    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            sku: Set(input.sku),
            description: Set(input.description),
            price: Set(input.price),
            inventory_quantity: Set(input.inventory_quantity),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = model.insert(&*self.db).await?;
        info!(product_id = %product.id, sku = %product.sku, "Created product");
        Ok(product)
    }

    /// Creates a variant under an existing product.
    #[instrument(skip(self, input))]
    pub async fn create_variant(
        &self,
        product_id: Uuid,
        input: CreateVariantInput,
    ) -> Result<product_variant::Model, ServiceError> {
        // Parent must exist
        self.get_product(product_id).await?;

        let now = Utc::now();
        let model = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(input.sku),
            title: Set(input.title),
            price: Set(input.price),
            inventory_quantity: Set(input.inventory_quantity),
            position: Set(input.position.unwrap_or(0)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let variant = model.insert(&*self.db).await?;
        info!(variant_id = %variant.id, sku = %variant.sku, "Created variant");
        Ok(variant)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn get_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<product_variant::Model, ServiceError> {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))
    }

    /// Resolves the unit price for a cart line: the variant price when a
    /// variant is referenced, the product price otherwise.
    #[instrument(skip(self))]
    pub async fn unit_price(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Decimal, ServiceError> {
        let product = self.get_product(product_id).await?;

        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is not available",
                product_id
            )));
        }

        match variant_id {
            Some(variant_id) => {
                let variant = self.get_variant(variant_id).await?;
                if variant.product_id != product_id {
                    return Err(ServiceError::InvalidInput(format!(
                        "Variant {} does not belong to product {}",
                        variant_id, product_id
                    )));
                }
                Ok(variant.price)
            }
            None => Ok(product.price),
        }
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub inventory_quantity: i32,
}

/// Input for creating a variant
#[derive(Debug, Deserialize)]
pub struct CreateVariantInput {
    pub sku: String,
    pub title: String,
    pub price: Decimal,
    #[serde(default)]
    pub inventory_quantity: i32,
    pub position: Option<i32>,
}
