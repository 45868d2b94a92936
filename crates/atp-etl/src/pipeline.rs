//! Pipeline orchestration
//!
//! One run is a strict sequence:
//!
//! `TruncateStaging -> Extract+Stage (batch loop) -> Verify -> Reconcile`
//!
//! Any step failure short-circuits the remaining steps and becomes the
//! run's terminal error. The only sanctioned deviation is
//! [`RunOptions::allow_partial`], which downgrades individual batch-load
//! failures to logged warnings and lets the loop continue — the
//! historical behavior of these jobs, off by default.
//!
//! Runs hold no locks: the scheduler must not overlap two runs of the
//! same pipeline, since both would share one staging table.

use atp_common::{AtpError, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::athena::QueryEngine;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::reconcile::{self, TableSpec};
use crate::stage::Stager;
use crate::warehouse::Warehouse;

/// One pipeline instance: a query and the table pair it feeds.
#[derive(Debug, Clone)]
pub struct PipelineDef {
    pub name: &'static str,
    pub query: String,
    pub table: TableSpec,
}

/// Per-run knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum rows per staged batch.
    pub chunk_size: usize,
    /// Keep loading after a failed batch instead of aborting the run.
    /// Staging then holds a partial extraction, which is logged but not
    /// treated as an error.
    pub allow_partial: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            allow_partial: false,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub batches_loaded: u64,
    pub batches_failed: u64,
    pub rows_extracted: u64,
    pub rows_staged: u64,
    pub rows_reconciled: u64,
}

/// Execute one full pipeline run.
pub async fn run(
    engine: &QueryEngine,
    warehouse: &Warehouse,
    def: &PipelineDef,
    opts: &RunOptions,
) -> Result<RunStats> {
    let run_id = Uuid::new_v4();
    info!(pipeline = def.name, %run_id, chunk_size = opts.chunk_size, "run started");

    let mut stats = RunStats::default();
    let stager = Stager::new(warehouse, &def.table);

    // 1. Truncate staging (idempotent)
    stager.truncate().await?;

    // 2. Extract and stage, one bounded batch at a time
    let mut results = engine.execute(&def.query, opts.chunk_size).await?;
    while let Some(batch) = results.next_batch().await? {
        stats.rows_extracted += batch.len() as u64;

        match stager.load_batch(&batch).await {
            Ok(rows) => {
                stats.batches_loaded += 1;
                stats.rows_staged += rows;
            },
            Err(e) if opts.allow_partial => {
                stats.batches_failed += 1;
                error!(
                    pipeline = def.name,
                    %run_id,
                    error = %e,
                    "batch load failed, continuing (allow_partial)"
                );
            },
            Err(e) => return Err(e),
        }
    }

    info!(
        pipeline = def.name,
        %run_id,
        rows = stats.rows_extracted,
        batches = stats.batches_loaded,
        "extraction finished"
    );

    // 3. Confirm the staging table holds what was loaded before merging
    let staged = stager.row_count().await?;
    if staged != stats.rows_staged as i64 {
        return Err(AtpError::Staging(format!(
            "staging verification failed: counted {} rows, loaded {}",
            staged, stats.rows_staged
        )));
    }
    if stats.batches_failed > 0 {
        warn!(
            pipeline = def.name,
            %run_id,
            batches_failed = stats.batches_failed,
            "reconciling a partial extraction"
        );
    }

    // 4. Reconcile staging into the target
    stats.rows_reconciled = reconcile::reconcile(warehouse, &def.table).await?;

    info!(
        pipeline = def.name,
        %run_id,
        rows_staged = stats.rows_staged,
        rows_reconciled = stats.rows_reconciled,
        "run completed"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = RunOptions::default();
        assert_eq!(opts.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(!opts.allow_partial);
    }
}
