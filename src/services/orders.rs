use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, Statement, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::cart::{normalize_lines, NormalizedLine, RawCartLine, UnknownCategoryPolicy};
use crate::models::order::{OrderStatus, PaymentMethodGroup};
use crate::schema::SchemaProfile;
use crate::services::param;
use crate::services::payments::{normalize_method, parse_uuid};

/// Request/Response types for the order service
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Table number, when the QR code carries one.
    pub table_ref: Option<i32>,
    /// Free-form table label for zones without numbered tables.
    #[validate(length(max = 64, message = "Table label too long"))]
    pub table_label: Option<String>,
    /// Free-text payment method as typed/selected by the customer.
    pub payment_method: Option<String>,
    #[validate(length(max = 500, message = "Order note too long"))]
    pub order_note: Option<String>,
    pub items: Vec<RawCartLine>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResult {
    pub order_id: Uuid,
    /// Authoritative total, summed from the persisted line rows.
    pub total_amount: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub table_ref: Option<i32>,
    /// Table number as text, falling back to the label column when the
    /// numeric reference is absent.
    pub table_display: Option<String>,
    pub status: String,
    pub total_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub item_type: String,
    pub ref_id: String,
    pub name: String,
    pub qty: i32,
    pub unit_price: Decimal,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub summary: OrderSummary,
    pub order_note: Option<String>,
    pub payment_method: Option<String>,
    pub items: Vec<OrderLine>,
}

/// Service owning the order placement transaction and the status
/// lifecycle. All writes for one order happen inside one database
/// transaction; concurrent requests run independent transactions against
/// the shared pool (several open orders per table are legitimate, so no
/// per-table serialization).
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    profile: Arc<SchemaProfile>,
    event_sender: Option<EventSender>,
    unknown_category_policy: UnknownCategoryPolicy,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        profile: Arc<SchemaProfile>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            profile,
            event_sender,
            unknown_category_policy: UnknownCategoryPolicy::default(),
        }
    }

    /// Overrides the handling of unrecognized item categories.
    pub fn with_unknown_category_policy(mut self, policy: UnknownCategoryPolicy) -> Self {
        self.unknown_category_policy = policy;
        self
    }

    /// Places an order: header, line items, authoritative total, and (when
    /// the table exists) a payment record, atomically.
    ///
    /// The header insert is intentionally minimal; optional columns are
    /// widened by targeted updates so the same code runs against schema
    /// variants that never received those migrations. Any failure rolls
    /// the whole transaction back.
    #[instrument(skip(self, request), fields(table_ref = ?request.table_ref))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResult, ServiceError> {
        request.validate()?;

        // Fast-path rejection before touching the pool; no order id is
        // ever allocated for an empty cart.
        if normalize_lines(&request.items, self.unknown_category_policy)?.is_empty() {
            return Err(ServiceError::NoItems);
        }

        let method_group = request
            .payment_method
            .as_deref()
            .and_then(PaymentMethodGroup::classify);
        let status = OrderStatus::initial_for(method_group);

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::from(e)
        })?;

        let (total_amount, payment_recorded) = match self
            .run_creation(&txn, order_id, status, now, &request)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, order_id = %order_id, "Rollback failed");
                }
                return Err(err);
            }
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::from(e)
        })?;

        info!(
            order_id = %order_id,
            total = %total_amount,
            status = %status,
            "Order created"
        );

        self.emit(Event::OrderCreated(order_id)).await;
        if payment_recorded {
            self.emit(Event::PaymentRecorded {
                order_id,
                amount: if status == OrderStatus::Paid {
                    total_amount
                } else {
                    Decimal::ZERO
                },
            })
            .await;
        }

        Ok(CreateOrderResult {
            order_id,
            total_amount,
            status,
        })
    }

    /// The write sequence inside the transaction. Any error here makes
    /// the caller roll back everything.
    async fn run_creation(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
        request: &CreateOrderRequest,
    ) -> Result<(Decimal, bool), ServiceError> {
        self.insert_header(txn, order_id, request.table_ref, status, now)
            .await?;
        self.apply_optional_header_fields(txn, order_id, request)
            .await?;

        // Defensive second pass with the same rules as the fast path.
        let lines = normalize_lines(&request.items, self.unknown_category_policy)?;
        if lines.is_empty() {
            return Err(ServiceError::NoItems);
        }
        self.insert_lines(txn, order_id, &lines).await?;

        let total_amount = self.sum_persisted_lines(txn, order_id).await?;
        if self.profile.has_total_amount {
            self.write_total(txn, order_id, total_amount).await?;
        }

        let payment_recorded = if self.profile.has_payments_table {
            self.insert_payment(txn, order_id, status, total_amount, request)
                .await?;
            true
        } else {
            false
        };

        Ok((total_amount, payment_recorded))
    }

    async fn insert_header(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        table_ref: Option<i32>,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let backend = txn.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "INSERT INTO orders (id, table_ref, status, created_at) VALUES ({}, {}, {}, {})",
                param(backend, 1),
                param(backend, 2),
                param(backend, 3),
                param(backend, 4)
            ),
            [
                order_id.to_string().into(),
                table_ref.into(),
                status.as_str().into(),
                created_at.into(),
            ],
        );
        txn.execute(stmt).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order header");
            ServiceError::from(e)
        })?;
        Ok(())
    }

    /// Widens the minimal header with each optional column this
    /// deployment actually has, one targeted update per column.
    async fn apply_optional_header_fields(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        request: &CreateOrderRequest,
    ) -> Result<(), ServiceError> {
        if self.profile.has_table_label {
            if let Some(label) = non_empty(request.table_label.as_deref()) {
                self.update_header_column(txn, order_id, "table_label", label)
                    .await?;
            }
        }
        if self.profile.has_order_note {
            if let Some(note) = non_empty(request.order_note.as_deref()) {
                self.update_header_column(txn, order_id, "order_note", note)
                    .await?;
            }
        }
        if self.profile.has_payment_method {
            if let Some(method) = non_empty(request.payment_method.as_deref()) {
                self.update_header_column(txn, order_id, "payment_method", method)
                    .await?;
            }
        }
        Ok(())
    }

    async fn update_header_column(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        column: &str,
        value: &str,
    ) -> Result<(), ServiceError> {
        let backend = txn.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "UPDATE orders SET {column} = {} WHERE id = {}",
                param(backend, 1),
                param(backend, 2)
            ),
            [value.into(), order_id.to_string().into()],
        );
        txn.execute(stmt).await?;
        Ok(())
    }

    async fn insert_lines(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        lines: &[NormalizedLine],
    ) -> Result<(), ServiceError> {
        let backend = txn.get_database_backend();
        let qty_col = self.profile.quantity_column.as_str();

        for line in lines {
            let stmt = if self.profile.has_item_note {
                Statement::from_sql_and_values(
                    backend,
                    format!(
                        "INSERT INTO order_items \
                         (id, order_id, item_type, item_ref, name, {qty_col}, unit_price, item_note) \
                         VALUES ({}, {}, {}, {}, {}, {}, {}, {})",
                        param(backend, 1),
                        param(backend, 2),
                        param(backend, 3),
                        param(backend, 4),
                        param(backend, 5),
                        param(backend, 6),
                        param(backend, 7),
                        param(backend, 8)
                    ),
                    [
                        Uuid::new_v4().to_string().into(),
                        order_id.to_string().into(),
                        line.category.as_str().into(),
                        line.ref_id.clone().into(),
                        line.name.clone().into(),
                        line.qty.into(),
                        line.unit_price.into(),
                        line.note.clone().into(),
                    ],
                )
            } else {
                Statement::from_sql_and_values(
                    backend,
                    format!(
                        "INSERT INTO order_items \
                         (id, order_id, item_type, item_ref, name, {qty_col}, unit_price) \
                         VALUES ({}, {}, {}, {}, {}, {}, {})",
                        param(backend, 1),
                        param(backend, 2),
                        param(backend, 3),
                        param(backend, 4),
                        param(backend, 5),
                        param(backend, 6),
                        param(backend, 7)
                    ),
                    [
                        Uuid::new_v4().to_string().into(),
                        order_id.to_string().into(),
                        line.category.as_str().into(),
                        line.ref_id.clone().into(),
                        line.name.clone().into(),
                        line.qty.into(),
                        line.unit_price.into(),
                    ],
                )
            };

            txn.execute(stmt).await.map_err(|e| {
                error!(error = %e, order_id = %order_id, item_ref = %line.ref_id, "Failed to insert order line");
                ServiceError::from(e)
            })?;
        }
        Ok(())
    }

    /// The single source of truth for the order's monetary value: qty x
    /// price summed from the rows just written, never a client figure.
    async fn sum_persisted_lines(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let backend = txn.get_database_backend();
        let qty_col = self.profile.quantity_column.as_str();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "SELECT {qty_col} AS qty, unit_price FROM order_items WHERE order_id = {}",
                param(backend, 1)
            ),
            [order_id.to_string().into()],
        );

        let rows = txn.query_all(stmt).await?;
        let mut total = Decimal::ZERO;
        for row in rows {
            let qty: i32 = row.try_get("", "qty")?;
            let unit_price: Decimal = row.try_get("", "unit_price")?;
            total += unit_price * Decimal::from(qty);
        }
        Ok(total)
    }

    async fn write_total(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        total: Decimal,
    ) -> Result<(), ServiceError> {
        let backend = txn.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "UPDATE orders SET total_amount = {} WHERE id = {}",
                param(backend, 1),
                param(backend, 2)
            ),
            [total.into(), order_id.to_string().into()],
        );
        txn.execute(stmt).await?;
        Ok(())
    }

    /// Exactly one payment row per order: the full total for
    /// immediate-settlement methods, zero for deferred ones.
    async fn insert_payment(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        status: OrderStatus,
        total: Decimal,
        request: &CreateOrderRequest,
    ) -> Result<(), ServiceError> {
        let method = normalize_method(
            request.payment_method.as_deref(),
            &self.profile.payment_method_values,
        );
        let amount = if status == OrderStatus::Paid {
            total
        } else {
            Decimal::ZERO
        };

        let backend = txn.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "INSERT INTO payments (id, order_id, amount, method, paid_at) \
                 VALUES ({}, {}, {}, {}, {})",
                param(backend, 1),
                param(backend, 2),
                param(backend, 3),
                param(backend, 4),
                param(backend, 5)
            ),
            [
                Uuid::new_v4().to_string().into(),
                order_id.to_string().into(),
                amount.into(),
                method.into(),
                Utc::now().into(),
            ],
        );
        txn.execute(stmt).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert payment record");
            ServiceError::from(e)
        })?;
        Ok(())
    }

    /// Unconditional status overwrite. Staff tooling assigns any status
    /// string (seated, done, cancelled, ...); no transition validation.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %status))]
    pub async fn set_status(&self, order_id: Uuid, status: &str) -> Result<(), ServiceError> {
        let status = status.trim();
        if status.is_empty() {
            return Err(ServiceError::ValidationError(
                "Status must not be empty".to_string(),
            ));
        }

        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "UPDATE orders SET status = {} WHERE id = {}",
                param(backend, 1),
                param(backend, 2)
            ),
            [status.into(), order_id.to_string().into()],
        );

        let result = self.db.execute(stmt).await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Order not found".to_string()));
        }

        info!(order_id = %order_id, status = %status, "Order status updated");
        self.emit(Event::OrderStatusChanged {
            order_id,
            new_status: status.to_string(),
        })
        .await;
        Ok(())
    }

    /// Shortcut for settling an order after the fact.
    pub async fn mark_paid(&self, order_id: Uuid) -> Result<(), ServiceError> {
        self.set_status(order_id, OrderStatus::Paid.as_str()).await
    }

    /// Deletes an order and everything hanging off it in one transaction:
    /// line items, then payments, then the header. There is no window
    /// where the lines are gone but the header remains.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn remove_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let backend = txn.get_database_backend();
        let id_value: sea_orm::Value = order_id.to_string().into();

        let exists = txn
            .query_one(Statement::from_sql_and_values(
                backend,
                format!(
                    "SELECT 1 FROM orders WHERE id = {} LIMIT 1",
                    param(backend, 1)
                ),
                [id_value.clone()],
            ))
            .await?
            .is_some();
        if !exists {
            txn.rollback().await?;
            return Err(ServiceError::NotFound("Order not found".to_string()));
        }

        txn.execute(Statement::from_sql_and_values(
            backend,
            format!(
                "DELETE FROM order_items WHERE order_id = {}",
                param(backend, 1)
            ),
            [id_value.clone()],
        ))
        .await?;

        if self.profile.has_payments_table {
            txn.execute(Statement::from_sql_and_values(
                backend,
                format!(
                    "DELETE FROM payments WHERE order_id = {}",
                    param(backend, 1)
                ),
                [id_value.clone()],
            ))
            .await?;
        }

        txn.execute(Statement::from_sql_and_values(
            backend,
            format!("DELETE FROM orders WHERE id = {}", param(backend, 1)),
            [id_value],
        ))
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order deletion");
            ServiceError::from(e)
        })?;

        info!(order_id = %order_id, "Order deleted");
        self.emit(Event::OrderDeleted(order_id)).await;
        Ok(())
    }

    /// All orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderSummary>, ServiceError> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_string(
            backend,
            format!(
                "SELECT {} FROM orders ORDER BY created_at DESC",
                self.summary_projection()
            ),
        );

        let rows = self.db.query_all(stmt).await?;
        rows.iter().map(row_to_summary).collect()
    }

    /// Orders for one table, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_by_table(
        &self,
        table_ref: i32,
    ) -> Result<Vec<OrderSummary>, ServiceError> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "SELECT {} FROM orders WHERE table_ref = {} ORDER BY created_at DESC",
                self.summary_projection(),
                param(backend, 1)
            ),
            [table_ref.into()],
        );

        let rows = self.db.query_all(stmt).await?;
        rows.iter().map(row_to_summary).collect()
    }

    /// One order with its line items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderDetails>, ServiceError> {
        let backend = self.db.get_database_backend();
        let note_col = if self.profile.has_order_note {
            "order_note"
        } else {
            "NULL AS order_note"
        };
        let method_col = if self.profile.has_payment_method {
            "payment_method"
        } else {
            "NULL AS payment_method"
        };

        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "SELECT {}, {note_col}, {method_col} FROM orders WHERE id = {} LIMIT 1",
                self.summary_projection(),
                param(backend, 1)
            ),
            [order_id.to_string().into()],
        );

        let Some(row) = self.db.query_one(stmt).await? else {
            return Ok(None);
        };
        let summary = row_to_summary(&row)?;
        let order_note: Option<String> = row.try_get("", "order_note")?;
        let payment_method: Option<String> = row.try_get("", "payment_method")?;

        let qty_col = self.profile.quantity_column.as_str();
        let note_col = if self.profile.has_item_note {
            "item_note"
        } else {
            "NULL AS item_note"
        };
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "SELECT id, item_type, item_ref, name, {qty_col} AS qty, unit_price, {note_col} \
                 FROM order_items WHERE order_id = {}",
                param(backend, 1)
            ),
            [order_id.to_string().into()],
        );

        let rows = self.db.query_all(stmt).await?;
        let items = rows
            .iter()
            .map(|row| {
                let id: String = row.try_get("", "id")?;
                Ok(OrderLine {
                    id: parse_uuid(&id)?,
                    item_type: row.try_get("", "item_type")?,
                    ref_id: row.try_get("", "item_ref")?,
                    name: row.try_get("", "name")?,
                    qty: row.try_get("", "qty")?,
                    unit_price: row.try_get("", "unit_price")?,
                    note: row.try_get("", "item_note")?,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(Some(OrderDetails {
            summary,
            order_note,
            payment_method,
            items,
        }))
    }

    fn summary_projection(&self) -> String {
        let label_col = if self.profile.has_table_label {
            "table_label"
        } else {
            "NULL AS table_label"
        };
        let total_col = if self.profile.has_total_amount {
            "total_amount"
        } else {
            "NULL AS total_amount"
        };
        format!("id, table_ref, {label_col}, status, {total_col}, created_at")
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send order event");
            }
        }
    }
}

fn row_to_summary(row: &sea_orm::QueryResult) -> Result<OrderSummary, ServiceError> {
    let id: String = row.try_get("", "id")?;
    let table_ref: Option<i32> = row.try_get("", "table_ref")?;
    let table_label: Option<String> = row.try_get("", "table_label")?;
    let table_display = table_ref.map(|n| n.to_string()).or(table_label);

    Ok(OrderSummary {
        id: parse_uuid(&id)?,
        table_ref,
        table_display,
        status: row.try_get("", "status")?,
        total_amount: row.try_get("", "total_amount")?,
        created_at: row.try_get("", "created_at")?,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
