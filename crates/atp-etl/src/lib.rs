//! ATP ETL Library
//!
//! Incremental staging-and-merge loads from the network's shared Athena
//! views into the PostgreSQL reporting warehouse.
//!
//! Each pipeline follows the same shape:
//!
//! 1. Truncate the staging table
//! 2. Run one large analytical query and stream the results into the
//!    staging table in bounded batches (`COPY ... FROM STDIN`)
//! 3. Verify the staged row count against what was extracted
//! 4. Reconcile staging into the target table (delete-then-insert or
//!    upsert on the natural key)
//!
//! # Example
//!
//! ```no_run
//! use atp_etl::{config::Config, athena::QueryEngine, warehouse::Warehouse};
//! use atp_etl::pipeline::{self, RunOptions};
//! use atp_etl::pipelines::logistics;
//!
//! #[tokio::main]
//! async fn main() -> atp_common::Result<()> {
//!     let config = Config::load()?;
//!     let engine = QueryEngine::new(&config.athena);
//!     let warehouse = Warehouse::new(&config.warehouse);
//!
//!     let def = logistics::pipeline();
//!     pipeline::run(&engine, &warehouse, &def, &RunOptions::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod athena;
pub mod batch;
pub mod config;
pub mod pipeline;
pub mod pipelines;
pub mod reconcile;
pub mod stage;
pub mod warehouse;
