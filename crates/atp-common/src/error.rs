//! Error types for the ATP pipelines
//!
//! The taxonomy mirrors the three pipeline phases: extraction from the
//! source query engine, bulk staging into the warehouse, and the final
//! reconciliation statements. Any phase failure aborts the remaining
//! steps of a run and surfaces as the run's terminal error.

use thiserror::Error;

/// Result type alias for ATP operations
pub type Result<T> = std::result::Result<T, AtpError>;

/// Main error type for the ATP pipelines
#[derive(Error, Debug)]
pub enum AtpError {
    /// Source query engine connection or query failure
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Bulk-load or connection failure against the staging table
    #[error("Staging error: {0}")]
    Staging(String),

    /// Delete/insert/upsert statement failure against the target table
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_phase() {
        let err = AtpError::Staging("COPY failed".to_string());
        assert_eq!(err.to_string(), "Staging error: COPY failed");

        let err = AtpError::Extraction("query cancelled".to_string());
        assert!(err.to_string().starts_with("Extraction error:"));
    }
}
