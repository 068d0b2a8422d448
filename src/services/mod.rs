// Core services
pub mod orders;
pub mod payments;

use sea_orm::DbBackend;

/// Positional parameter placeholder for hand-written SQL. Postgres uses
/// numbered parameters; MySQL and SQLite use `?`.
pub(crate) fn param(backend: DbBackend, n: usize) -> String {
    match backend {
        DbBackend::Postgres => format!("${n}"),
        _ => "?".to_string(),
    }
}
