//! Reconciliation of staging into target tables
//!
//! Two merge strategies, chosen per table at configuration time:
//!
//! - **Delete-then-insert**: delete target rows whose natural key
//!   appears in staging, then insert everything staged. Two sequential
//!   statements, each committed on its own — the documented contract
//!   for the logistics table.
//! - **Upsert**: one `INSERT ... ON CONFLICT ... DO UPDATE` keyed on a
//!   lower-cased concatenation of the natural key columns. Atomic per
//!   statement; the target never transiently loses rows.
//!
//! Both strategies assume the staging table was fully populated for
//! this run before reconciliation starts.

use atp_common::{AtpError, Result};
use tracing::info;

use crate::warehouse::{qualified, quote_ident, Warehouse};

/// Natural-key merge strategy for one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Delete matching keys from the target, then insert all staged rows.
    DeleteInsert {
        key_columns: &'static [&'static str],
    },
    /// Single upsert keyed on `lower(key1 || key2 || ...)`; every
    /// non-key column is updated from the staged row on conflict.
    Upsert {
        key_columns: &'static [&'static str],
    },
}

/// Staging/target table pair with a fixed column contract.
///
/// `staging_columns` is the full staging column list (and COPY order);
/// `target_columns` is what reconciliation carries into the target. The
/// two differ where staging holds bookkeeping columns the target does
/// not keep (the orders table's `row_updated_at`).
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub schema: &'static str,
    pub staging_table: &'static str,
    pub target_table: &'static str,
    pub staging_columns: &'static [&'static str],
    pub target_columns: &'static [&'static str],
    pub strategy: MergeStrategy,
}

impl TableSpec {
    pub fn staging(&self) -> String {
        qualified(self.schema, self.staging_table)
    }

    pub fn target(&self) -> String {
        qualified(self.schema, self.target_table)
    }

    fn key_columns(&self) -> &'static [&'static str] {
        match self.strategy {
            MergeStrategy::DeleteInsert { key_columns } => key_columns,
            MergeStrategy::Upsert { key_columns } => key_columns,
        }
    }
}

/// Apply the spec's merge strategy. Staging must already hold this
/// run's full extraction.
pub async fn reconcile(warehouse: &Warehouse, spec: &TableSpec) -> Result<u64> {
    match spec.strategy {
        MergeStrategy::DeleteInsert { .. } => {
            let deleted = execute(warehouse, &delete_statement(spec)).await?;
            info!(target = %spec.target(), deleted, "matching target rows deleted");

            let inserted = execute(warehouse, &insert_statement(spec)).await?;
            info!(target = %spec.target(), inserted, "staged rows inserted");
            Ok(inserted)
        },
        MergeStrategy::Upsert { .. } => {
            let merged = execute(warehouse, &upsert_statement(spec)).await?;
            info!(target = %spec.target(), merged, "staged rows upserted");
            Ok(merged)
        },
    }
}

async fn execute(warehouse: &Warehouse, sql: &str) -> Result<u64> {
    warehouse
        .execute(sql)
        .await
        .map_err(|e| AtpError::Reconciliation(e.to_string()))
}

/// `DELETE FROM target USING staging WHERE <keys equal>`
///
/// An empty staging table joins to nothing, so this deletes nothing.
fn delete_statement(spec: &TableSpec) -> String {
    let conditions = spec
        .key_columns()
        .iter()
        .map(|c| {
            format!(
                "target.{col} = stage.{col}",
                col = quote_ident(c)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");

    format!(
        "DELETE FROM {target} target USING {staging} stage WHERE {conditions}",
        target = spec.target(),
        staging = spec.staging(),
        conditions = conditions
    )
}

/// `INSERT INTO target (cols) SELECT stage.cols FROM staging stage`
fn insert_statement(spec: &TableSpec) -> String {
    format!(
        "INSERT INTO {target} ({columns}) SELECT {selects} FROM {staging} stage",
        target = spec.target(),
        columns = column_list(spec.target_columns),
        selects = select_list(spec.target_columns),
        staging = spec.staging()
    )
}

/// `INSERT ... ON CONFLICT (lower(k1 || k2 || ...)) DO UPDATE SET ...`
///
/// The conflict target matches the expression index on the target
/// table; every non-key column is refreshed from the staged row.
fn upsert_statement(spec: &TableSpec) -> String {
    let keys = spec.key_columns();
    let conflict_expr = keys
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(" || ");

    let updates = spec
        .target_columns
        .iter()
        .filter(|c| !keys.contains(*c))
        .map(|c| {
            format!(
                "{col} = EXCLUDED.{col}",
                col = quote_ident(c)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {target} AS target ({columns}) SELECT {selects} FROM {staging} stage \
         ON CONFLICT (lower({conflict_expr})) DO UPDATE SET {updates}",
        target = spec.target(),
        columns = column_list(spec.target_columns),
        selects = select_list(spec.target_columns),
        staging = spec.staging(),
        conflict_expr = conflict_expr,
        updates = updates
    )
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("stage.{}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delete_insert_spec() -> TableSpec {
        TableSpec {
            schema: "inc",
            staging_table: "stage_t",
            target_table: "t",
            staging_columns: &["order_id", "txn_id", "status"],
            target_columns: &["order_id", "txn_id", "status"],
            strategy: MergeStrategy::DeleteInsert {
                key_columns: &["order_id", "txn_id"],
            },
        }
    }

    fn upsert_spec() -> TableSpec {
        TableSpec {
            schema: "inc",
            staging_table: "stage_t",
            target_table: "t",
            staging_columns: &["Seller NP", "order_id", "status", "row_updated_at"],
            target_columns: &["Seller NP", "order_id", "status"],
            strategy: MergeStrategy::Upsert {
                key_columns: &["Seller NP", "order_id"],
            },
        }
    }

    #[test]
    fn test_delete_statement_joins_on_all_keys() {
        let sql = delete_statement(&delete_insert_spec());
        assert_eq!(
            sql,
            "DELETE FROM \"inc\".\"t\" target USING \"inc\".\"stage_t\" stage \
             WHERE target.\"order_id\" = stage.\"order_id\" \
             AND target.\"txn_id\" = stage.\"txn_id\""
        );
    }

    #[test]
    fn test_insert_statement_lists_target_columns() {
        let sql = insert_statement(&delete_insert_spec());
        assert_eq!(
            sql,
            "INSERT INTO \"inc\".\"t\" (\"order_id\", \"txn_id\", \"status\") \
             SELECT stage.\"order_id\", stage.\"txn_id\", stage.\"status\" \
             FROM \"inc\".\"stage_t\" stage"
        );
    }

    #[test]
    fn test_upsert_conflicts_on_lowered_key_expression() {
        let sql = upsert_statement(&upsert_spec());
        assert!(sql.contains("ON CONFLICT (lower(\"Seller NP\" || \"order_id\"))"));
        assert!(sql.starts_with(
            "INSERT INTO \"inc\".\"t\" AS target (\"Seller NP\", \"order_id\", \"status\")"
        ));
    }

    #[test]
    fn test_upsert_updates_only_non_key_columns() {
        let sql = upsert_statement(&upsert_spec());
        assert!(sql.ends_with("DO UPDATE SET \"status\" = EXCLUDED.\"status\""));
        assert!(!sql.contains("\"order_id\" = EXCLUDED"));
    }

    #[test]
    fn test_upsert_does_not_carry_staging_only_columns() {
        // row_updated_at exists in staging but not in the target contract.
        let sql = upsert_statement(&upsert_spec());
        assert!(!sql.contains("row_updated_at"));
    }
}
