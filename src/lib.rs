//! Tableside API Library
//!
//! Order placement and settlement core for a QR-code restaurant
//! table-ordering platform. Customers order per table; this crate owns the
//! transactional unit of work that persists an order, its line items, and
//! its payment record with consistent totals, while tolerating a schema
//! that has evolved additively across deployments.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod logging;
pub mod models;
pub mod schema;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::schema::{SchemaIntrospector, SchemaProfile};
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub profile: Arc<SchemaProfile>,
    pub event_sender: EventSender,
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl AppState {
    /// Connects to the database, loads the schema profile once, and wires
    /// up the service layer. Fails fast if the catalog probe fails so no
    /// request ever runs against unknown schema facts.
    pub async fn initialize(
        config: AppConfig,
        event_sender: EventSender,
    ) -> Result<Self, ServiceError> {
        let db = Arc::new(db::establish_connection_with_config(&config.db_config()).await?);

        let introspector = SchemaIntrospector::new(db.clone());
        let profile = Arc::new(SchemaProfile::load(&introspector).await?);

        let orders = OrderService::new(db.clone(), profile.clone(), Some(event_sender.clone()));
        let payments = PaymentService::new(db.clone(), profile.clone());

        Ok(Self {
            db,
            config,
            profile,
            event_sender,
            orders,
            payments,
        })
    }
}
