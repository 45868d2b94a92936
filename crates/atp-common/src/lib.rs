//! ATP Common Library
//!
//! Shared error handling and logging for the ATP warehouse pipelines.
//!
//! # Overview
//!
//! This crate provides the pieces every workspace member needs:
//!
//! - **Error Handling**: the pipeline error taxonomy and result type
//! - **Logging**: tracing-based logging configured from the environment
//!
//! # Example
//!
//! ```no_run
//! use atp_common::{AtpError, Result};
//!
//! fn check_chunk_size(n: usize) -> Result<()> {
//!     if n == 0 {
//!         return Err(AtpError::Config("chunk size must be positive".into()));
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{AtpError, Result};
