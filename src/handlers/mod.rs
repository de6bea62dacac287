pub mod carts;
pub mod checkout;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod session;

use crate::{
    events::EventSender,
    notifications::OrderNotifier,
    services::{
        cart::CartService, catalog::CatalogService, customers::CustomerService,
        inventory::InventoryService, order_status::OrderStatusService, orders::OrderService,
        payments::PaymentGateway,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Aggregated services used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub customers: Arc<CustomerService>,
    pub inventory: Arc<InventoryService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Option<Arc<OrderNotifier>>,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let cart = Arc::new(CartService::new(
            db.clone(),
            event_sender.clone(),
            catalog.clone(),
        ));
        let customers = Arc::new(CustomerService::new(db.clone(), event_sender.clone()));
        let inventory = Arc::new(InventoryService::new(db.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            customers.clone(),
            inventory.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(db, event_sender, notifier));

        Self {
            catalog,
            cart,
            customers,
            inventory,
            orders,
            order_status,
            payments,
        }
    }
}
