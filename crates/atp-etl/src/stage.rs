//! Staging table loads
//!
//! The stager owns the staging side of a run: truncate once at the
//! start, then bulk-load each extracted batch with
//! `COPY ... FROM STDIN WITH (FORMAT CSV)`.
//!
//! Each batch is loaded on a fresh connection. That trades connection
//! overhead for isolation: a failed COPY aborts and closes its own
//! session without touching rows committed by earlier batches.

use atp_common::{AtpError, Result};
use tracing::{debug, info};

use crate::batch::RowBatch;
use crate::reconcile::TableSpec;
use crate::warehouse::{quote_ident, Warehouse};

/// Loader for one pipeline's staging table.
pub struct Stager<'a> {
    warehouse: &'a Warehouse,
    staging_table: String,
    copy_sql: String,
}

impl<'a> Stager<'a> {
    pub fn new(warehouse: &'a Warehouse, spec: &TableSpec) -> Self {
        Self {
            warehouse,
            staging_table: spec.staging(),
            copy_sql: copy_statement(spec),
        }
    }

    /// Clear the staging table. Idempotent; fails loudly if the table
    /// does not exist.
    pub async fn truncate(&self) -> Result<()> {
        let sql = format!("TRUNCATE {}", self.staging_table);
        self.warehouse
            .execute(&sql)
            .await
            .map_err(|e| AtpError::Staging(format!("truncate {}: {}", self.staging_table, e)))?;
        info!(table = %self.staging_table, "staging table truncated");
        Ok(())
    }

    /// Bulk-load one batch and return the number of rows copied.
    ///
    /// On any failure the COPY is aborted, so the batch either lands
    /// completely or not at all.
    pub async fn load_batch(&self, batch: &RowBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let data = batch.to_csv()?;

        let mut conn = self
            .warehouse
            .connect()
            .await
            .map_err(|e| AtpError::Staging(format!("connect for batch load: {}", e)))?;

        let mut copy = conn
            .copy_in_raw(&self.copy_sql)
            .await
            .map_err(|e| AtpError::Staging(format!("begin COPY: {}", e)))?;

        if let Err(e) = copy.send(data.as_slice()).await {
            let _ = copy.abort("batch load failed").await;
            return Err(AtpError::Staging(format!("send COPY data: {}", e)));
        }

        let rows = copy
            .finish()
            .await
            .map_err(|e| AtpError::Staging(format!("finish COPY: {}", e)))?;

        let _ = sqlx::Connection::close(conn).await;

        debug!(table = %self.staging_table, rows, "batch staged");
        Ok(rows)
    }

    /// Current staging row count, used to confirm the load before
    /// reconciliation instead of pausing on a fixed delay.
    pub async fn row_count(&self) -> Result<i64> {
        self.warehouse
            .row_count(&self.staging_table)
            .await
            .map_err(|e| AtpError::Staging(format!("count {}: {}", self.staging_table, e)))
    }
}

/// `COPY schema.staging (cols...) FROM STDIN WITH (FORMAT CSV)`
fn copy_statement(spec: &TableSpec) -> String {
    let columns = spec
        .staging_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT CSV)",
        spec.staging(),
        columns
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::MergeStrategy;

    fn spec() -> TableSpec {
        TableSpec {
            schema: "inc",
            staging_table: "stage_t",
            target_table: "t",
            staging_columns: &["id", "Seller NP", "value"],
            target_columns: &["id", "Seller NP", "value"],
            strategy: MergeStrategy::DeleteInsert {
                key_columns: &["id"],
            },
        }
    }

    #[test]
    fn test_copy_statement_lists_quoted_columns() {
        let sql = copy_statement(&spec());
        assert_eq!(
            sql,
            "COPY \"inc\".\"stage_t\" (\"id\", \"Seller NP\", \"value\") \
             FROM STDIN WITH (FORMAT CSV)"
        );
    }
}
