use std::path::PathBuf;
use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};
use serde_json::json;
use tableside_api::{
    db::{establish_connection_with_config, DbConfig},
    events::{self, Event},
    models::cart::RawCartLine,
    schema::{SchemaIntrospector, SchemaProfile},
    services::{orders::OrderService, payments::PaymentService},
};
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

const FULL_SCHEMA: &[&str] = &[
    "CREATE TABLE orders (
        id TEXT PRIMARY KEY,
        table_ref INTEGER,
        table_label TEXT,
        status TEXT NOT NULL,
        total_amount REAL,
        order_note TEXT,
        payment_method TEXT,
        created_at TEXT NOT NULL
    )",
    // qty bound makes a mid-transaction insert failure injectable
    "CREATE TABLE order_items (
        id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL,
        item_type TEXT NOT NULL,
        item_ref TEXT NOT NULL,
        name TEXT NOT NULL,
        qty INTEGER NOT NULL CHECK (qty > 0 AND qty <= 100),
        unit_price REAL NOT NULL,
        item_note TEXT
    )",
    "CREATE TABLE payments (
        id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL,
        amount REAL NOT NULL,
        method TEXT,
        paid_at TEXT NOT NULL
    )",
];

/// The oldest schema variant still deployed: no optional header columns,
/// the legacy quantity column name, and no payments table at all.
const REDUCED_SCHEMA: &[&str] = &[
    "CREATE TABLE orders (
        id TEXT PRIMARY KEY,
        table_ref INTEGER,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE order_items (
        id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL,
        item_type TEXT NOT NULL,
        item_ref TEXT NOT NULL,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price REAL NOT NULL
    )",
];

/// Helper harness wiring the service layer to a file-backed SQLite
/// database with a single-connection pool.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub profile: Arc<SchemaProfile>,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub events: Receiver<Event>,
    path: PathBuf,
}

impl TestApp {
    /// Every optional column and table present; profile loaded through
    /// the introspector. SQLite has no enum columns, so the payment
    /// method column is unconstrained here.
    pub async fn full() -> Self {
        Self::build(FULL_SCHEMA, None).await
    }

    /// Full schema, but with the payment method enumeration a MySQL
    /// deployment would declare, injected into the profile.
    pub async fn full_with_method_enum() -> Self {
        let values = ["cash", "card", "transfer", "qr", "promptpay"]
            .into_iter()
            .map(String::from)
            .collect();
        Self::build(FULL_SCHEMA, Some(values)).await
    }

    /// Reduced schema fixture for the schema-tolerance tests.
    pub async fn reduced() -> Self {
        Self::build(REDUCED_SCHEMA, None).await
    }

    async fn build(schema: &[&str], method_values: Option<Vec<String>>) -> Self {
        let path = std::env::temp_dir().join(format!("tableside-test-{}.db", Uuid::new_v4()));
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let db = Arc::new(
            establish_connection_with_config(&config)
                .await
                .expect("connect to sqlite"),
        );

        for sql in schema {
            db.execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
                .await
                .expect("create schema");
        }

        let introspector = SchemaIntrospector::new(db.clone());
        let mut profile = SchemaProfile::load(&introspector)
            .await
            .expect("load schema profile");
        if let Some(values) = method_values {
            profile.payment_method_values = values;
        }
        let profile = Arc::new(profile);

        let (sender, events) = events::channel(32);
        let orders = OrderService::new(db.clone(), profile.clone(), Some(sender));
        let payments = PaymentService::new(db.clone(), profile.clone());

        Self {
            db,
            profile,
            orders,
            payments,
            events,
            path,
        }
    }

    pub async fn count(&self, table: &str) -> i64 {
        let row = self
            .db
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                format!("SELECT COUNT(*) AS n FROM {table}"),
            ))
            .await
            .expect("count query")
            .expect("count row");
        row.try_get("", "n").expect("count value")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Builds a raw cart line the way the frontend submits them.
pub fn cart_line(item_type: &str, ref_id: &str, name: &str, price: f64, qty: i64) -> RawCartLine {
    RawCartLine {
        item_type: item_type.to_string(),
        ref_id: json!(ref_id),
        name: Some(name.to_string()),
        price: json!(price),
        qty: json!(qty),
        item_note: None,
    }
}
