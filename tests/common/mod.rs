#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::collections::HashMap;
use std::sync::Arc;
use storefront_api::{
    config::{AppConfig, SiteSettings},
    entities::product,
    errors::ServiceError,
    events::{process_events, EventSender},
    handlers::AppServices,
    migrator::Migrator,
    services::{
        catalog::CreateProductInput,
        orders::{Address, CreateOrderRequest},
        payments::{PaymentGateway, PaymentIntent},
    },
    sites::{SiteConfig, SiteRegistry},
    AppState,
};
use tokio::sync::mpsc;

pub const WEBHOOK_SECRET: &str = "whsec_test_0123456789abcdef";

/// In-memory SQLite with the schema applied. Single connection, so every
/// query sees the same database.
pub async fn memory_db() -> Arc<DatabaseConnection> {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite connect");
    Migrator::up(&db, None).await.expect("migrations");
    Arc::new(db)
}

/// File-backed SQLite for tests that need genuine connection concurrency.
pub async fn file_db(path: &std::path::Path) -> Arc<DatabaseConnection> {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let mut opt = ConnectOptions::new(url);
    opt.max_connections(10).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite connect");
    Migrator::up(&db, None).await.expect("migrations");
    Arc::new(db)
}

/// Event sender with a drain task, so service calls never block on a full
/// channel.
pub fn event_sender() -> Arc<EventSender> {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(process_events(rx));
    Arc::new(EventSender::new(tx))
}

/// Gateway stub that always issues the same intent.
pub struct StaticGateway;

#[async_trait]
impl PaymentGateway for StaticGateway {
    async fn create_payment_intent(
        &self,
        _amount_minor_units: i64,
        _currency: &str,
        customer_ref: Option<&str>,
    ) -> Result<PaymentIntent, ServiceError> {
        Ok(PaymentIntent {
            intent_id: "pi_test_1".to_string(),
            client_secret: "pi_test_1_secret".to_string(),
            customer_ref: customer_ref.map(str::to_string),
        })
    }
}

pub fn services(db: Arc<DatabaseConnection>) -> AppServices {
    AppServices::new(db, event_sender(), Arc::new(StaticGateway), None)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        environment: "test".into(),
        log_level: "warn".into(),
        log_json: false,
        auto_migrate: true,
        db_max_connections: 1,
        db_min_connections: 1,
        cors_allowed_origins: None,
        payment_api_base: "https://api.stripe.com".into(),
        payment_secret_key: None,
        payment_webhook_secret: WEBHOOK_SECRET.into(),
        payment_webhook_tolerance_secs: 300,
        order_confirmation_url: None,
        order_confirmation_secret: None,
        cart_sweep_interval_secs: 3600,
        default_site: SiteSettings {
            name: "Test storefront".into(),
            currency: "USD".into(),
            tax_rate: Some(Decimal::new(8, 2)),
            shipping_cost: Some(Decimal::new(300, 2)),
        },
        sites: HashMap::new(),
    }
}

/// Full app state over an in-memory database, for router-level tests.
pub async fn app_state() -> Arc<AppState> {
    let db = memory_db().await;
    let cfg = test_config();
    let services = services(db.clone());
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(process_events(rx));

    Arc::new(AppState {
        db,
        sites: Arc::new(SiteRegistry::from_config(&cfg)),
        config: cfg,
        event_sender: EventSender::new(tx),
        services,
    })
}

pub fn default_site() -> SiteConfig {
    SiteConfig {
        key: "default".into(),
        name: "Test storefront".into(),
        currency: "USD".into(),
        tax_rate: Some(Decimal::new(8, 2)),
        shipping_cost: Some(Decimal::new(300, 2)),
    }
}

pub fn site_without_rates() -> SiteConfig {
    SiteConfig {
        key: "default".into(),
        name: "Test storefront".into(),
        currency: "USD".into(),
        tax_rate: None,
        shipping_cost: None,
    }
}

pub async fn seed_product(
    services: &AppServices,
    sku: &str,
    price: Decimal,
    inventory_quantity: i32,
) -> product::Model {
    services
        .catalog
        .create_product(CreateProductInput {
            name: format!("Product {}", sku),
            sku: sku.to_string(),
            description: None,
            price,
            inventory_quantity,
        })
        .await
        .expect("seed product")
}

pub fn shipping_address() -> Address {
    Address {
        first_name: "Jane".into(),
        last_name: "Doe".into(),
        company: None,
        address_line_1: "1 Main St".into(),
        address_line_2: None,
        city: "Springfield".into(),
        province: "IL".into(),
        country_code: "US".into(),
        postal_code: "62704".into(),
        phone: None,
    }
}

pub fn order_request(email: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        email: email.into(),
        shipping_address: shipping_address(),
        payment_intent_id: None,
    }
}
