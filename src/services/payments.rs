use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::PaymentMethodGroup;
use crate::schema::SchemaProfile;
use crate::services::param;

/// Maps free-text payment method input to a value the database's enum
/// column accepts.
///
/// With no enum constraint the input passes through unchanged. Otherwise
/// the input is matched through its synonym group (group key first, then
/// any alias present in the enumeration), falling back to a direct
/// case-insensitive match. `None` means "record no payment method", never
/// an error.
pub fn normalize_method(raw: Option<&str>, allowed: &[String]) -> Option<String> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    if allowed.is_empty() {
        return Some(raw.to_string());
    }

    let val = raw.to_lowercase();

    if let Some(group) = PaymentMethodGroup::classify(&val) {
        if let Some(hit) = allowed
            .iter()
            .find(|option| option.to_lowercase() == group.key())
        {
            return Some(hit.clone());
        }
        if let Some(hit) = allowed
            .iter()
            .find(|option| group.aliases().contains(&option.to_lowercase().as_str()))
        {
            return Some(hit.clone());
        }
    }

    allowed
        .iter()
        .find(|option| option.to_lowercase() == val)
        .cloned()
}

/// One settlement record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub method: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Read paths over the payments table. Creation happens inside the order
/// transaction, not here.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    profile: Arc<SchemaProfile>,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, profile: Arc<SchemaProfile>) -> Self {
        Self { db, profile }
    }

    /// All payments, newest first. Empty when this deployment has no
    /// payments table.
    #[instrument(skip(self))]
    pub async fn list_payments(&self) -> Result<Vec<PaymentRecord>, ServiceError> {
        if !self.profile.has_payments_table {
            debug!("payments table absent; returning no records");
            return Ok(Vec::new());
        }

        let backend = self.db.get_database_backend();
        let stmt = Statement::from_string(
            backend,
            "SELECT id, order_id, amount, method, paid_at FROM payments ORDER BY paid_at DESC"
                .to_string(),
        );

        let rows = self.db.query_all(stmt).await?;
        rows.iter().map(row_to_payment).collect()
    }

    /// The settlement record for one order, if any.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_payment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<PaymentRecord>, ServiceError> {
        if !self.profile.has_payments_table {
            return Ok(None);
        }

        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "SELECT id, order_id, amount, method, paid_at FROM payments WHERE order_id = {} \
                 LIMIT 1",
                param(backend, 1)
            ),
            [order_id.to_string().into()],
        );

        match self.db.query_one(stmt).await? {
            Some(row) => Ok(Some(row_to_payment(&row)?)),
            None => Ok(None),
        }
    }
}

fn row_to_payment(row: &sea_orm::QueryResult) -> Result<PaymentRecord, ServiceError> {
    let id: String = row.try_get("", "id")?;
    let order_id: String = row.try_get("", "order_id")?;
    Ok(PaymentRecord {
        id: parse_uuid(&id)?,
        order_id: parse_uuid(&order_id)?,
        amount: row.try_get("", "amount")?,
        method: row.try_get("", "method")?,
        paid_at: row.try_get("", "paid_at")?,
    })
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw)
        .map_err(|e| ServiceError::InternalError(format!("Malformed id in database: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn canonical_values_normalize_to_themselves() {
        let options = allowed(&["cash", "card", "transfer"]);
        assert_eq!(
            normalize_method(Some("cash"), &options),
            Some("cash".to_string())
        );
        assert_eq!(
            normalize_method(Some("transfer"), &options),
            Some("transfer".to_string())
        );
    }

    #[test]
    fn aliases_in_a_group_normalize_identically() {
        let options = allowed(&["cash", "card", "transfer"]);
        let from_english = normalize_method(Some("cash"), &options);
        let from_thai = normalize_method(Some("เงินสด"), &options);
        assert_eq!(from_english, from_thai);

        for alias in ["bank", "bank transfer", "โอน", "โอนเงิน"] {
            assert_eq!(
                normalize_method(Some(alias), &options),
                Some("transfer".to_string()),
                "alias {alias:?} should land in the transfer group"
            );
        }
    }

    #[test]
    fn group_alias_present_in_enum_is_used_when_key_is_not() {
        // Enum stores the Thai spelling rather than the group key.
        let options = allowed(&["เงินสด", "card"]);
        assert_eq!(
            normalize_method(Some("cash"), &options),
            Some("เงินสด".to_string())
        );
    }

    #[test]
    fn direct_case_insensitive_match_is_the_fallback() {
        let options = allowed(&["Wallet", "cash"]);
        assert_eq!(
            normalize_method(Some("wallet"), &options),
            Some("Wallet".to_string())
        );
    }

    #[test]
    fn unconstrained_column_passes_raw_input_through() {
        assert_eq!(
            normalize_method(Some("anything goes"), &[]),
            Some("anything goes".to_string())
        );
    }

    #[test]
    fn no_match_and_no_input_yield_none() {
        let options = allowed(&["cash", "card"]);
        assert_eq!(normalize_method(Some("crypto"), &options), None);
        assert_eq!(normalize_method(Some("   "), &options), None);
        assert_eq!(normalize_method(None, &options), None);
    }
}
