//! Storefront API Library
//!
//! The order/checkout core of a multi-tenant storefront: session carts,
//! race-safe customer resolution, atomic inventory reservation, order
//! creation, and idempotent payment-webhook processing.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod sites;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub sites: Arc<sites::SiteRegistry>,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Builds the full application router. Layers (tracing, timeout, CORS,
/// compression) are applied by the binary.
pub fn app_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(handlers::carts::carts_routes())
        .merge(handlers::checkout::checkout_routes())
        .merge(handlers::orders::orders_routes())
        .merge(handlers::payment_webhooks::webhook_routes())
        .merge(handlers::health::health_routes())
}
