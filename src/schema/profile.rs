use tracing::info;

use crate::errors::ServiceError;
use crate::schema::SchemaIntrospector;

/// Which physical column name the line-item table uses for quantity. Two
/// names exist across deployments; older databases still carry
/// `quantity`, migrated ones use `qty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityColumn {
    Qty,
    Quantity,
}

impl QuantityColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantityColumn::Qty => "qty",
            QuantityColumn::Quantity => "quantity",
        }
    }
}

/// Immutable description of the optional parts of the deployed schema,
/// loaded once at startup and injected into the services. Replaces
/// per-request catalog probing: if loading fails, startup fails, and
/// afterwards every request runs against the same frozen facts.
#[derive(Debug, Clone)]
pub struct SchemaProfile {
    pub has_table_label: bool,
    pub has_order_note: bool,
    pub has_payment_method: bool,
    pub has_total_amount: bool,
    pub has_item_note: bool,
    pub quantity_column: QuantityColumn,
    pub has_payments_table: bool,
    /// Accepted values of `payments.method`, in declaration order. Empty
    /// when the column is unconstrained (or the table is absent), in
    /// which case raw input passes through unnormalized.
    pub payment_method_values: Vec<String>,
}

impl SchemaProfile {
    /// Probes the fixed set of optional schema points through the
    /// introspector and freezes the answers. Any probe failure aborts.
    pub async fn load(introspector: &SchemaIntrospector) -> Result<Self, ServiceError> {
        let has_table_label = introspector.column_exists("orders", "table_label").await?;
        let has_order_note = introspector.column_exists("orders", "order_note").await?;
        let has_payment_method = introspector
            .column_exists("orders", "payment_method")
            .await?;
        let has_total_amount = introspector.column_exists("orders", "total_amount").await?;
        let has_item_note = introspector.column_exists("order_items", "item_note").await?;

        let quantity_column = if introspector.column_exists("order_items", "qty").await? {
            QuantityColumn::Qty
        } else {
            QuantityColumn::Quantity
        };

        let has_payments_table = introspector.table_exists("payments").await?;
        let payment_method_values = if has_payments_table {
            introspector.enum_values("payments", "method").await?
        } else {
            Vec::new()
        };

        let profile = Self {
            has_table_label,
            has_order_note,
            has_payment_method,
            has_total_amount,
            has_item_note,
            quantity_column,
            has_payments_table,
            payment_method_values,
        };

        info!(?profile, "Schema profile loaded");
        Ok(profile)
    }

    /// Fixture: every optional column and table present, with the
    /// canonical payment method enumeration.
    pub fn full() -> Self {
        Self {
            has_table_label: true,
            has_order_note: true,
            has_payment_method: true,
            has_total_amount: true,
            has_item_note: true,
            quantity_column: QuantityColumn::Qty,
            has_payments_table: true,
            payment_method_values: ["cash", "card", "transfer", "qr", "promptpay"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Fixture: the oldest schema variant still in the field. No optional
    /// header columns, legacy `quantity` column name, no payments table.
    pub fn minimal() -> Self {
        Self {
            has_table_label: false,
            has_order_note: false,
            has_payment_method: false,
            has_total_amount: false,
            has_item_note: false,
            quantity_column: QuantityColumn::Quantity,
            has_payments_table: false,
            payment_method_values: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_describe_the_two_extremes() {
        let full = SchemaProfile::full();
        assert!(full.has_total_amount && full.has_payments_table);
        assert_eq!(full.quantity_column.as_str(), "qty");
        assert_eq!(full.payment_method_values.len(), 5);

        let minimal = SchemaProfile::minimal();
        assert!(!minimal.has_total_amount && !minimal.has_payments_table);
        assert_eq!(minimal.quantity_column.as_str(), "quantity");
        assert!(minimal.payment_method_values.is_empty());
    }
}
