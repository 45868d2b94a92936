//! Order fulfillment pipeline
//!
//! Extracts one day of order-level updates from the shared order
//! fulfillment view and upserts them into `local_internal.order_level`,
//! keyed on the lower-cased seller/order/provider/transaction
//! expression index. The target date is substituted into the query's
//! `row_updated_at` filter and defaults to the current day.

use atp_common::{AtpError, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::pipeline::PipelineDef;
use crate::reconcile::{MergeStrategy, TableSpec};
use crate::warehouse::Warehouse;

const DAILY_QUERY: &str = include_str!("../../sql/orders_daily.sql");

/// Marker in the query text replaced by the run's target date.
const TARGET_DATE_MARKER: &str = "{target_date}";

/// Full staging column list, in COPY order. `row_updated_at` is staged
/// for traceability but not carried into the target.
const STAGING_COLUMNS: &[&str] = &[
    "Buyer NP",
    "Seller NP",
    "Network order id",
    "Provider Id",
    "Seller Name",
    "Seller Pincode",
    "Delivery Pincode",
    "cancellation_code",
    "Created at",
    "Date",
    "domain",
    "on-time-del",
    "Shipped at",
    "Ready to Ship",
    "Promised time",
    "tat_dif",
    "tat_diff_days",
    "day_diff",
    "min_diff",
    "tat_time",
    "no_key",
    "ONDC order_status",
    "Updated at",
    "Category",
    "Consolidated_category",
    "row_updated_at",
    "network_transaction_id",
];

const TARGET_COLUMNS: &[&str] = &[
    "Buyer NP",
    "Seller NP",
    "Network order id",
    "Provider Id",
    "Seller Name",
    "Seller Pincode",
    "Delivery Pincode",
    "cancellation_code",
    "Created at",
    "Date",
    "domain",
    "on-time-del",
    "Shipped at",
    "Ready to Ship",
    "Promised time",
    "tat_dif",
    "tat_diff_days",
    "day_diff",
    "min_diff",
    "tat_time",
    "no_key",
    "ONDC order_status",
    "Updated at",
    "Category",
    "Consolidated_category",
    "network_transaction_id",
];

/// Matches the unique expression index on the target:
/// `lower("Seller NP" || "Network order id" || "Provider Id" || network_transaction_id)`.
const KEY_COLUMNS: &[&str] = &[
    "Seller NP",
    "Network order id",
    "Provider Id",
    "network_transaction_id",
];

pub fn table_spec() -> TableSpec {
    TableSpec {
        schema: "local_internal",
        staging_table: "stage_order_level",
        target_table: "order_level",
        staging_columns: STAGING_COLUMNS,
        target_columns: TARGET_COLUMNS,
        strategy: MergeStrategy::Upsert {
            key_columns: KEY_COLUMNS,
        },
    }
}

/// The day's query with the target date substituted in.
pub fn daily_query(target_date: NaiveDate) -> String {
    DAILY_QUERY.replace(
        TARGET_DATE_MARKER,
        &target_date.format("%Y-%m-%d").to_string(),
    )
}

pub fn pipeline(target_date: NaiveDate) -> PipelineDef {
    PipelineDef {
        name: "orders",
        query: daily_query(target_date),
        table: table_spec(),
    }
}

// ============================================================================
// Dimension refresh
// ============================================================================

/// Idempotent dimension top-ups from the staged rows: each statement
/// inserts only values the dimension table has not seen yet.
const DIMENSION_QUERIES: &[(&str, &str)] = &[
    (
        "dim_seller_np",
        r#"
        INSERT INTO local_internal.dim_seller_np (seller_np)
        SELECT DISTINCT "Seller NP" FROM local_internal.stage_order_level o
        WHERE o."Seller NP" IS NOT NULL
        AND NOT EXISTS (
            SELECT 1 FROM local_internal.dim_seller_np d WHERE o."Seller NP" = d.seller_np
        )
        "#,
    ),
    (
        "dim_buyer_np",
        r#"
        INSERT INTO local_internal.dim_buyer_np (buyer_np)
        SELECT DISTINCT "Buyer NP" FROM local_internal.stage_order_level o
        WHERE o."Buyer NP" IS NOT NULL
        AND NOT EXISTS (
            SELECT 1 FROM local_internal.dim_buyer_np d WHERE o."Buyer NP" = d.buyer_np
        )
        "#,
    ),
    (
        "dim_category",
        r#"
        INSERT INTO local_internal.dim_category (category)
        SELECT DISTINCT "Category" FROM local_internal.stage_order_level o
        WHERE o."Category" IS NOT NULL
        AND NOT EXISTS (
            SELECT 1 FROM local_internal.dim_category d WHERE o."Category" = d.category
        )
        "#,
    ),
    (
        "dim_provider_key",
        r#"
        INSERT INTO local_internal.dim_item_provider_key(provider_k)
        SELECT DISTINCT LOWER(o."Seller NP" || '_' || o."Provider Id")
        FROM local_internal.stage_order_level o
        WHERE LOWER(o."Seller NP" || '_' || o."Provider Id") IS NOT NULL
        AND NOT EXISTS (
            SELECT 1 FROM local_internal.dim_item_provider_key d
            WHERE d.provider_k = LOWER(o."Seller NP" || '_' || o."Provider Id")
        )
        "#,
    ),
];

/// Top up the order dimension tables from the current staging contents.
/// Runs after reconciliation, while staging still holds the day's rows.
pub async fn refresh_dimensions(warehouse: &Warehouse) -> Result<()> {
    for (name, sql) in DIMENSION_QUERIES {
        let inserted = warehouse
            .execute(sql)
            .await
            .map_err(|e| AtpError::Reconciliation(format!("dimension {}: {}", name, e)))?;
        info!(dimension = name, inserted, "dimension refreshed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_carries_one_extra_column() {
        assert_eq!(STAGING_COLUMNS.len(), 27);
        assert_eq!(TARGET_COLUMNS.len(), 26);
        assert!(STAGING_COLUMNS.contains(&"row_updated_at"));
        assert!(!TARGET_COLUMNS.contains(&"row_updated_at"));
    }

    #[test]
    fn test_key_columns_are_part_of_the_target_contract() {
        for key in KEY_COLUMNS {
            assert!(TARGET_COLUMNS.contains(key), "missing key column {}", key);
        }
    }

    #[test]
    fn test_daily_query_substitutes_target_date() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 29).unwrap();
        let query = daily_query(date);
        assert!(query.contains("= DATE('2025-08-29')"));
        assert!(!query.contains(TARGET_DATE_MARKER));
    }

    #[test]
    fn test_dimension_queries_read_from_staging() {
        for (name, sql) in DIMENSION_QUERIES {
            assert!(
                sql.contains("local_internal.stage_order_level"),
                "{} does not read staging",
                name
            );
            assert!(sql.contains("NOT EXISTS"), "{} is not idempotent", name);
        }
    }
}
