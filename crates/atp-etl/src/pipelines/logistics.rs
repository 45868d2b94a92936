//! Logistics fulfillment pipeline
//!
//! Extracts the current day's updates from the shared logistics item
//! fulfillment view and merges them into
//! `logistics_incremental.master_log` via delete-then-insert on the
//! fulfillment natural key. The query itself filters on
//! `date(now())`, so this pipeline takes no date parameter.

use crate::pipeline::PipelineDef;
use crate::reconcile::{MergeStrategy, TableSpec};

const DAILY_QUERY: &str = include_str!("../../sql/logistics_daily.sql");

/// Staging and target share the same 29-column contract.
const COLUMNS: &[&str] = &[
    "bap_id",
    "bpp_id",
    "order_id",
    "transaction_id",
    "fulfillment_status",
    "cod_order",
    "date",
    "order_created_at",
    "cancellation_code",
    "latest_order_status",
    "retail_order_id",
    "pick_up_pincode",
    "delivery_pincode",
    "retail_category",
    "shipment_type",
    "motorable_distance",
    "provider_name",
    "pickup_tat",
    "rts_tat",
    "f_ready_to_ship_at_date",
    "f_at_pickup_from_date",
    "f_agent_assigned_at_date",
    "delivered_date",
    "cancelled_date",
    "picked_date",
    "drop_row",
    "row_updated",
    "promised_time_to_deliver",
    "fulfillment_type",
];

/// A fulfillment is identified by its counterparty, order, transaction
/// and creation time.
const KEY_COLUMNS: &[&str] = &["bpp_id", "order_id", "transaction_id", "order_created_at"];

pub fn table_spec() -> TableSpec {
    TableSpec {
        schema: "logistics_incremental",
        staging_table: "inc_log",
        target_table: "master_log",
        staging_columns: COLUMNS,
        target_columns: COLUMNS,
        strategy: MergeStrategy::DeleteInsert {
            key_columns: KEY_COLUMNS,
        },
    }
}

pub fn pipeline() -> PipelineDef {
    PipelineDef {
        name: "logistics",
        query: DAILY_QUERY.to_string(),
        table: table_spec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_has_29_columns() {
        assert_eq!(COLUMNS.len(), 29);
    }

    #[test]
    fn test_key_columns_are_part_of_the_contract() {
        for key in KEY_COLUMNS {
            assert!(COLUMNS.contains(key), "missing key column {}", key);
        }
    }

    #[test]
    fn test_query_filters_on_current_date() {
        let def = pipeline();
        assert!(def.query.contains("= date(now())"));
        assert!(def
            .query
            .contains("shared_logistics_item_fulfillment_view_with_date"));
    }
}
