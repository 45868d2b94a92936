//! Pipeline definitions
//!
//! One module per data domain. Each exposes a [`crate::pipeline::PipelineDef`]
//! binding the domain's analytical query (a `sql/` asset, Presto
//! dialect, run on the source engine) to its staging/target table pair
//! and merge strategy in the warehouse.

pub mod logistics;
pub mod orders;
