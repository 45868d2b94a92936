//! Warehouse access
//!
//! Thin connection layer over the target PostgreSQL store. Every
//! operation opens a connection scoped to the call and closes it before
//! returning, so no connection outlives the statement it served. That
//! keeps batch loads isolated from each other: one failed COPY cannot
//! leave a poisoned session behind for the next statement.

use crate::config::WarehouseConfig;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::debug;

/// Handle on the target warehouse.
#[derive(Debug, Clone)]
pub struct Warehouse {
    options: PgConnectOptions,
}

impl Warehouse {
    pub fn new(config: &WarehouseConfig) -> Self {
        Self {
            options: config.connect_options(),
        }
    }

    /// Open a fresh connection.
    pub async fn connect(&self) -> sqlx::Result<PgConnection> {
        PgConnection::connect_with(&self.options).await
    }

    /// Execute one statement on a fresh connection and return the
    /// affected row count. The statement runs in its own implicit
    /// transaction and is committed (or rolled back) on its own.
    pub async fn execute(&self, sql: &str) -> sqlx::Result<u64> {
        let mut conn = self.connect().await?;
        let result = conn.execute(sql).await;
        // Close cleanly on both paths; a close failure after a
        // successful statement is not worth failing the run for.
        let _ = conn.close().await;
        debug!(rows = ?result.as_ref().map(|r| r.rows_affected()), "statement executed");
        result.map(|r| r.rows_affected())
    }

    /// Row count of a (schema-qualified, already-quoted) table.
    pub async fn row_count(&self, qualified_table: &str) -> sqlx::Result<i64> {
        let mut conn = self.connect().await?;
        let sql = format!("SELECT count(*) FROM {}", qualified_table);
        let result: sqlx::Result<i64> = sqlx::query_scalar(&sql).fetch_one(&mut conn).await;
        let _ = conn.close().await;
        result
    }
}

/// Double-quote an SQL identifier, escaping embedded quotes.
///
/// The warehouse tables use mixed-case column names with spaces
/// ("Seller NP", "on-time-del"), so every generated statement quotes
/// every identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `schema.table` with both parts quoted.
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_plain() {
        assert_eq!(quote_ident("order_id"), "\"order_id\"");
    }

    #[test]
    fn test_quote_ident_with_space_and_case() {
        assert_eq!(quote_ident("Seller NP"), "\"Seller NP\"");
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(
            qualified("logistics_incremental", "inc_log"),
            "\"logistics_incremental\".\"inc_log\""
        );
    }
}
