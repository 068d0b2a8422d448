use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ServiceError;

/// Closed set of catalog categories a line item can reference. Each
/// category is an independently priced catalog (its own admin CRUD
/// surface); the category tag on a line records which one the reference
/// id points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    MainDish,
    Snack,
    Drink,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::MainDish => "main_dish",
            ItemCategory::Snack => "snack",
            ItemCategory::Drink => "drink",
        }
    }

    /// Recognizes the synonym and casing variants the frontends have sent
    /// over time. Unrecognized input is an explicit `None`, not a guess;
    /// the caller decides what to do with it via `UnknownCategoryPolicy`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "drink" | "drinks" | "beverage" => Some(ItemCategory::Drink),
            "snack" | "snacks" => Some(ItemCategory::Snack),
            "main_dish" | "main" | "maindish" | "food" | "foods" | "main-dish" | "main dish" => {
                Some(ItemCategory::MainDish)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a line whose category tag is unrecognized.
///
/// `DefaultToDrink` preserves the platform's historical behavior (unknown
/// tags were always treated as drinks). `Reject` fails the whole cart with
/// a validation error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownCategoryPolicy {
    #[default]
    DefaultToDrink,
    Reject,
}

/// One cart entry as submitted by the client, before validation. Numeric
/// fields arrive as arbitrary JSON (frontends have sent both numbers and
/// strings), so they are kept loose here and coerced during
/// normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCartLine {
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub ref_id: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub qty: Value,
    #[serde(default)]
    pub item_note: Option<String>,
}

/// A validated, canonical line item ready for persistence. Name and price
/// are captured at order time so later catalog edits never rewrite
/// historical orders.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLine {
    pub category: ItemCategory,
    pub ref_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub qty: i32,
    pub note: Option<String>,
}

impl NormalizedLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.qty)
    }
}

/// Canonicalizes and filters raw cart lines.
///
/// A line survives only if its reference id is non-empty after trimming
/// and its quantity coerces to a strictly positive integer. Prices that
/// fail to parse become zero rather than rejecting the line; the order
/// total is computed later from persisted rows, so a zero price can never
/// corrupt it. Pure transform, no I/O.
pub fn normalize_lines(
    raw: &[RawCartLine],
    policy: UnknownCategoryPolicy,
) -> Result<Vec<NormalizedLine>, ServiceError> {
    let mut lines = Vec::with_capacity(raw.len());

    for line in raw {
        let category = match ItemCategory::parse(&line.item_type) {
            Some(category) => category,
            None => match policy {
                UnknownCategoryPolicy::DefaultToDrink => ItemCategory::Drink,
                UnknownCategoryPolicy::Reject => {
                    return Err(ServiceError::ValidationError(format!(
                        "Unknown item category: {:?}",
                        line.item_type.trim()
                    )));
                }
            },
        };

        let ref_id = coerce_string(&line.ref_id);
        let qty = coerce_int(&line.qty);
        if ref_id.is_empty() || qty <= 0 {
            continue;
        }

        let name = line
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("-")
            .to_string();

        let note = line
            .item_note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        lines.push(NormalizedLine {
            category,
            ref_id,
            name,
            unit_price: coerce_decimal(&line.price),
            qty,
            note,
        });
    }

    Ok(lines)
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn coerce_decimal(value: &Value) -> Decimal {
    match value {
        // JSON number literals convert exactly via their decimal text form
        Value::Number(n) => n.to_string().parse().unwrap_or(Decimal::ZERO),
        Value::String(s) => s.trim().parse().unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

fn coerce_int(value: &Value) -> i32 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn line(item_type: &str, ref_id: Value, price: Value, qty: Value) -> RawCartLine {
        RawCartLine {
            item_type: item_type.to_string(),
            ref_id,
            name: Some("Iced Tea".to_string()),
            price,
            qty,
            item_note: None,
        }
    }

    #[test]
    fn category_synonyms_collapse() {
        for raw in ["drink", "Drinks", " beverage "] {
            assert_eq!(ItemCategory::parse(raw), Some(ItemCategory::Drink));
        }
        for raw in ["snack", "SNACKS"] {
            assert_eq!(ItemCategory::parse(raw), Some(ItemCategory::Snack));
        }
        for raw in ["main_dish", "main", "maindish", "food", "foods", "main-dish", "Main Dish"] {
            assert_eq!(ItemCategory::parse(raw), Some(ItemCategory::MainDish));
        }
        assert_eq!(ItemCategory::parse("dessert"), None);
    }

    #[test]
    fn unknown_category_defaults_to_drink_under_legacy_policy() {
        let raw = vec![line("unknown-category", json!("X9"), json!(10), json!(1))];
        let lines = normalize_lines(&raw, UnknownCategoryPolicy::DefaultToDrink).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].category, ItemCategory::Drink);
    }

    #[test]
    fn unknown_category_errors_under_reject_policy() {
        let raw = vec![line("unknown-category", json!("X9"), json!(10), json!(1))];
        let err = normalize_lines(&raw, UnknownCategoryPolicy::Reject).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn lines_without_ref_or_positive_qty_are_dropped() {
        let raw = vec![
            line("drink", json!("  "), json!(25), json!(2)),
            line("drink", json!("D1"), json!(25), json!(0)),
            line("drink", json!("D2"), json!(25), json!(-1)),
            line("drink", json!("D3"), json!(25), json!(2)),
        ];
        let lines = normalize_lines(&raw, UnknownCategoryPolicy::default()).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].ref_id, "D3");
    }

    #[test]
    fn numeric_fields_coerce_from_strings_and_numbers() {
        let raw = vec![line("snack", json!(42), json!("12.50"), json!("3"))];
        let lines = normalize_lines(&raw, UnknownCategoryPolicy::default()).unwrap();
        assert_eq!(lines[0].ref_id, "42");
        assert_eq!(lines[0].unit_price, dec!(12.50));
        assert_eq!(lines[0].qty, 3);
        assert_eq!(lines[0].line_total(), dec!(37.50));
    }

    #[test]
    fn unparseable_price_becomes_zero_but_keeps_the_line() {
        let raw = vec![line("drink", json!("D1"), json!("free!!"), json!(1))];
        let lines = normalize_lines(&raw, UnknownCategoryPolicy::default()).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit_price, Decimal::ZERO);
    }

    #[test]
    fn missing_name_is_captured_as_placeholder() {
        let raw = vec![RawCartLine {
            item_type: "drink".to_string(),
            ref_id: json!("D1"),
            name: None,
            price: json!(25),
            qty: json!(1),
            item_note: Some("  no ice  ".to_string()),
        }];
        let lines = normalize_lines(&raw, UnknownCategoryPolicy::default()).unwrap();
        assert_eq!(lines[0].name, "-");
        assert_eq!(lines[0].note.as_deref(), Some("no ice"));
    }
}
