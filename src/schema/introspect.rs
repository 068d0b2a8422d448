use std::sync::Arc;

use dashmap::DashMap;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};
use tracing::debug;

use crate::errors::ServiceError;

/// Answers "does this column/table exist" and "what values does this enum
/// column accept" from catalog metadata, scoped to the current database.
///
/// Answers are cached indefinitely per key; the schema is assumed stable
/// after deploy, so entries are never invalidated. The cache is safe for
/// concurrent first-access races: both racers write the same fact.
pub struct SchemaIntrospector {
    db: Arc<DatabaseConnection>,
    columns: DashMap<(String, String), bool>,
    tables: DashMap<String, bool>,
    enums: DashMap<(String, String), Vec<String>>,
}

impl SchemaIntrospector {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            columns: DashMap::new(),
            tables: DashMap::new(),
            enums: DashMap::new(),
        }
    }

    /// True when `table.column` exists in the current database. O(1) after
    /// the first call per key. Catalog query failures propagate; the
    /// conditional logic downstream depends on correct answers.
    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool, ServiceError> {
        let key = (table.to_string(), column.to_string());
        if let Some(known) = self.columns.get(&key) {
            return Ok(*known);
        }

        let backend = self.db.get_database_backend();
        let stmt = match backend {
            DbBackend::MySql => Statement::from_sql_and_values(
                backend,
                "SELECT 1 FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ? LIMIT 1",
                [table.into(), column.into()],
            ),
            DbBackend::Postgres => Statement::from_sql_and_values(
                backend,
                "SELECT 1 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2 \
                 LIMIT 1",
                [table.into(), column.into()],
            ),
            DbBackend::Sqlite => Statement::from_sql_and_values(
                backend,
                "SELECT 1 FROM pragma_table_info(?) WHERE name = ? LIMIT 1",
                [table.into(), column.into()],
            ),
        };

        let exists = self
            .db
            .query_one(stmt)
            .await
            .map_err(|e| ServiceError::SchemaIntrospection(e.to_string()))?
            .is_some();

        debug!(table, column, exists, "probed column");
        self.columns.insert(key, exists);
        Ok(exists)
    }

    /// True when `table` exists in the current database.
    pub async fn table_exists(&self, table: &str) -> Result<bool, ServiceError> {
        if let Some(known) = self.tables.get(table) {
            return Ok(*known);
        }

        let backend = self.db.get_database_backend();
        let stmt = match backend {
            DbBackend::MySql => Statement::from_sql_and_values(
                backend,
                "SELECT 1 FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? LIMIT 1",
                [table.into()],
            ),
            DbBackend::Postgres => Statement::from_sql_and_values(
                backend,
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1 LIMIT 1",
                [table.into()],
            ),
            DbBackend::Sqlite => Statement::from_sql_and_values(
                backend,
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ? LIMIT 1",
                [table.into()],
            ),
        };

        let exists = self
            .db
            .query_one(stmt)
            .await
            .map_err(|e| ServiceError::SchemaIntrospection(e.to_string()))?
            .is_some();

        debug!(table, exists, "probed table");
        self.tables.insert(table.to_string(), exists);
        Ok(exists)
    }

    /// Ordered accepted values of an enum column, or empty when the column
    /// is missing or not an enum. MySQL declares enums inline in the
    /// column type; Postgres keeps them in `pg_enum`; SQLite has no enum
    /// type at all.
    pub async fn enum_values(&self, table: &str, column: &str) -> Result<Vec<String>, ServiceError> {
        let key = (table.to_string(), column.to_string());
        if let Some(known) = self.enums.get(&key) {
            return Ok(known.clone());
        }

        let backend = self.db.get_database_backend();
        let values = match backend {
            DbBackend::MySql => {
                let stmt = Statement::from_sql_and_values(
                    backend,
                    "SELECT COLUMN_TYPE AS column_type FROM information_schema.COLUMNS \
                     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?",
                    [table.into(), column.into()],
                );
                match self
                    .db
                    .query_one(stmt)
                    .await
                    .map_err(|e| ServiceError::SchemaIntrospection(e.to_string()))?
                {
                    Some(row) => {
                        let decl: String = row
                            .try_get("", "column_type")
                            .map_err(|e| ServiceError::SchemaIntrospection(e.to_string()))?;
                        parse_enum_declaration(&decl)
                    }
                    None => Vec::new(),
                }
            }
            DbBackend::Postgres => {
                let stmt = Statement::from_sql_and_values(
                    backend,
                    "SELECT e.enumlabel AS value FROM pg_enum e \
                     JOIN pg_type t ON t.oid = e.enumtypid \
                     WHERE t.typname = ( \
                         SELECT udt_name FROM information_schema.columns \
                         WHERE table_schema = current_schema() \
                           AND table_name = $1 AND column_name = $2 \
                     ) \
                     ORDER BY e.enumsortorder",
                    [table.into(), column.into()],
                );
                let rows = self
                    .db
                    .query_all(stmt)
                    .await
                    .map_err(|e| ServiceError::SchemaIntrospection(e.to_string()))?;
                rows.into_iter()
                    .filter_map(|row| row.try_get("", "value").ok())
                    .collect()
            }
            DbBackend::Sqlite => Vec::new(),
        };

        debug!(table, column, count = values.len(), "probed enum values");
        self.enums.insert(key, values.clone());
        Ok(values)
    }
}

/// Parses a MySQL textual enum declaration such as `enum('a','b','c')`
/// into its ordered literal values. Returns empty for anything that is
/// not an enum declaration. Handles commas inside quoted literals and
/// doubled-quote escapes.
pub fn parse_enum_declaration(decl: &str) -> Vec<String> {
    let trimmed = decl.trim();
    let lower = trimmed.to_lowercase();
    if !lower.starts_with("enum(") || !trimmed.ends_with(')') {
        return Vec::new();
    }
    let body = &trimmed["enum(".len()..trimmed.len() - 1];

    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if in_quotes => {
                // '' inside a literal is an escaped quote
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    current.push('\'');
                } else {
                    in_quotes = false;
                    values.push(std::mem::take(&mut current));
                }
            }
            '\'' => in_quotes = true,
            ',' if !in_quotes => {}
            _ if in_quotes => current.push(c),
            _ => {}
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_enum_declarations() {
        assert_eq!(
            parse_enum_declaration("enum('a','b','c')"),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            parse_enum_declaration("ENUM('cash','card','transfer')"),
            vec!["cash", "card", "transfer"]
        );
    }

    #[test]
    fn preserves_declaration_order() {
        assert_eq!(
            parse_enum_declaration("enum('qr','cash','promptpay')"),
            vec!["qr", "cash", "promptpay"]
        );
    }

    #[test]
    fn handles_quoted_commas_and_escaped_quotes() {
        assert_eq!(
            parse_enum_declaration("enum('a,b','it''s','c')"),
            vec!["a,b", "it's", "c"]
        );
    }

    #[test]
    fn non_enum_types_yield_nothing() {
        assert!(parse_enum_declaration("varchar(32)").is_empty());
        assert!(parse_enum_declaration("int").is_empty());
        assert!(parse_enum_declaration("").is_empty());
    }
}
