//! Row batches
//!
//! A [`RowBatch`] is one bounded slice of a query's result set: ordered
//! rows of uniform arity, every field already rendered as text the way
//! the source engine returned it. Batches are produced by the extractor,
//! handed to the stager exactly once, and dropped at the end of the
//! loop iteration.

use atp_common::{AtpError, Result};

/// One ordered field row; `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

/// An ordered, bounded batch of rows with a uniform column list.
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    rows: Vec<Row>,
}

impl RowBatch {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Serialize the batch to a header-less CSV buffer suitable for
    /// `COPY ... FROM STDIN WITH (FORMAT CSV)`.
    ///
    /// NULL fields are written as unquoted empty strings, which COPY's
    /// CSV mode reads back as NULL. Fields containing delimiters,
    /// quotes or newlines are quoted by the writer.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        for row in &self.rows {
            writer
                .write_record(row.iter().map(|field| field.as_deref().unwrap_or("")))
                .map_err(|e| AtpError::Staging(format!("CSV encoding failed: {}", e)))?;
        }

        writer
            .into_inner()
            .map_err(|e| AtpError::Staging(format!("CSV buffer flush failed: {}", e)))
    }
}

/// Accumulates rows in source order and cuts them into batches of at
/// most `chunk_size` rows.
#[derive(Debug)]
pub struct BatchBuilder {
    chunk_size: usize,
    pending: Vec<Row>,
}

impl BatchBuilder {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Row) {
        self.pending.push(row);
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Take one full batch if enough rows are buffered.
    pub fn next_full(&mut self) -> Option<RowBatch> {
        if self.pending.len() < self.chunk_size {
            return None;
        }
        let rows = self.pending.drain(..self.chunk_size).collect();
        Some(RowBatch::new(rows))
    }

    /// Drain whatever remains as a final, possibly short, batch.
    pub fn finish(&mut self) -> Option<RowBatch> {
        if self.pending.is_empty() {
            return None;
        }
        Some(RowBatch::new(std::mem::take(&mut self.pending)))
    }
}
