//! Source query engine (Athena) extraction
//!
//! Runs one analytical query against the shared data-lake views and
//! exposes the result set as a lazy sequence of bounded [`RowBatch`]es.
//! Result pages are pulled on demand, so the full result set is never
//! held in memory.
//!
//! Query completion is awaited with a bounded poll (fixed interval, hard
//! deadline) rather than a blind sleep.

use std::time::{Duration, Instant};

use atp_common::{AtpError, Result};
use aws_sdk_athena::config::{Credentials, Region};
use aws_sdk_athena::error::DisplayErrorContext;
use aws_sdk_athena::types::{
    QueryExecutionContext, QueryExecutionState, ResultConfiguration, Row,
};
use aws_sdk_athena::Client;
use tracing::{debug, info, warn};

use crate::batch::{BatchBuilder, RowBatch};
use crate::config::AthenaConfig;

/// Maximum rows per GetQueryResults page (service limit).
const RESULTS_PAGE_SIZE: i32 = 1000;

/// Client for the source query engine.
pub struct QueryEngine {
    client: Client,
    database: String,
    output_location: String,
    poll_interval: Duration,
    query_timeout: Duration,
}

impl QueryEngine {
    /// Build a client from static credentials, the same way the rest of
    /// the AWS surface is configured here.
    pub fn new(config: &AthenaConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "atp-etl",
        );

        let athena_config = aws_sdk_athena::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .build();

        Self {
            client: Client::from_conf(athena_config),
            database: config.database.clone(),
            output_location: config.output_location.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        }
    }

    /// Submit a query, wait for it to finish, and return a lazy cursor
    /// over its results cut into batches of at most `chunk_size` rows.
    pub async fn execute(&self, query: &str, chunk_size: usize) -> Result<QueryResults<'_>> {
        let execution_id = self.submit(query).await?;
        info!(%execution_id, "query submitted");

        self.wait_for_completion(&execution_id).await?;

        Ok(QueryResults {
            client: &self.client,
            execution_id,
            next_token: None,
            first_page: true,
            exhausted: false,
            columns: Vec::new(),
            builder: BatchBuilder::new(chunk_size),
            chunk_size: chunk_size.max(1),
        })
    }

    async fn submit(&self, query: &str) -> Result<String> {
        let context = QueryExecutionContext::builder()
            .database(&self.database)
            .build();
        let results = ResultConfiguration::builder()
            .output_location(&self.output_location)
            .build();

        let response = self
            .client
            .start_query_execution()
            .query_string(query)
            .query_execution_context(context)
            .result_configuration(results)
            .send()
            .await
            .map_err(|e| {
                AtpError::Extraction(format!(
                    "failed to start query: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        response
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| AtpError::Extraction("no query execution id returned".to_string()))
    }

    /// Poll query state until it succeeds, fails, or the deadline passes.
    async fn wait_for_completion(&self, execution_id: &str) -> Result<()> {
        let started = Instant::now();

        loop {
            let response = self
                .client
                .get_query_execution()
                .query_execution_id(execution_id)
                .send()
                .await
                .map_err(|e| {
                    AtpError::Extraction(format!(
                        "failed to poll query state: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;

            let status = response
                .query_execution()
                .and_then(|q| q.status())
                .ok_or_else(|| {
                    AtpError::Extraction("query execution status missing".to_string())
                })?;

            match status.state() {
                Some(QueryExecutionState::Succeeded) => {
                    debug!(%execution_id, elapsed = ?started.elapsed(), "query succeeded");
                    return Ok(());
                },
                Some(QueryExecutionState::Failed) | Some(QueryExecutionState::Cancelled) => {
                    let reason = status
                        .state_change_reason()
                        .unwrap_or("no reason given")
                        .to_string();
                    return Err(AtpError::Extraction(format!(
                        "query {} did not complete: {}",
                        execution_id, reason
                    )));
                },
                _ => {
                    if started.elapsed() > self.query_timeout {
                        return Err(AtpError::Extraction(format!(
                            "query {} still running after {:?}",
                            execution_id, self.query_timeout
                        )));
                    }
                    tokio::time::sleep(self.poll_interval).await;
                },
            }
        }
    }
}

/// Lazy cursor over a finished query's result pages.
pub struct QueryResults<'a> {
    client: &'a Client,
    execution_id: String,
    next_token: Option<String>,
    first_page: bool,
    exhausted: bool,
    columns: Vec<String>,
    builder: BatchBuilder,
    chunk_size: usize,
}

impl QueryResults<'_> {
    /// Column names reported by the engine (available after the first
    /// page has been fetched).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Pull the next batch of at most `chunk_size` rows, or `None` once
    /// the result set is exhausted. Row order is preserved within and
    /// across batches.
    pub async fn next_batch(&mut self) -> Result<Option<RowBatch>> {
        loop {
            if let Some(batch) = self.builder.next_full() {
                return Ok(Some(batch));
            }
            if self.exhausted {
                return Ok(self.builder.finish());
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let response = self
            .client
            .get_query_results()
            .query_execution_id(&self.execution_id)
            .max_results(RESULTS_PAGE_SIZE)
            .set_next_token(self.next_token.take())
            .send()
            .await
            .map_err(|e| {
                AtpError::Extraction(format!(
                    "failed to fetch result page: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        self.next_token = response.next_token().map(str::to_string);
        if self.next_token.is_none() {
            self.exhausted = true;
        }

        let Some(result_set) = response.result_set() else {
            self.exhausted = true;
            return Ok(());
        };

        if self.first_page {
            self.columns = result_set
                .result_set_metadata()
                .map(|m| {
                    m.column_info()
                        .iter()
                        .map(|c| c.name().to_string())
                        .collect()
                })
                .unwrap_or_default();
        }

        let rows = result_set.rows();
        if self.first_page && rows.is_empty() {
            warn!(execution_id = %self.execution_id, "first result page had no header row");
        }
        ingest_page(rows, self.first_page, &mut self.builder);
        self.first_page = false;

        debug!(
            execution_id = %self.execution_id,
            buffered = self.builder.buffered(),
            chunk_size = self.chunk_size,
            "result page fetched"
        );

        Ok(())
    }
}

/// Feed one page's rows into the builder. The engine returns the column
/// header as the first data row of the first page, so that row is
/// skipped; later pages carry data rows only.
fn ingest_page(rows: &[Row], first_page: bool, builder: &mut BatchBuilder) {
    let data_rows = if first_page {
        rows.get(1..).unwrap_or(&[])
    } else {
        rows
    };

    for row in data_rows {
        builder.push(convert_row(row));
    }
}

/// Every Athena result field arrives as an optional varchar.
fn convert_row(row: &Row) -> Vec<Option<String>> {
    row.data()
        .iter()
        .map(|datum| datum.var_char_value().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_athena::types::Datum;

    fn data_row(values: &[&str]) -> Row {
        let mut builder = Row::builder();
        for value in values {
            builder = builder.data(Datum::builder().var_char_value(*value).build());
        }
        builder.build()
    }

    fn staged(builder: &mut BatchBuilder) -> Vec<Vec<Option<String>>> {
        let mut rows = Vec::new();
        while let Some(batch) = builder.next_full() {
            rows.extend(batch.rows().to_vec());
        }
        if let Some(batch) = builder.finish() {
            rows.extend(batch.rows().to_vec());
        }
        rows
    }

    #[test]
    fn test_convert_row_maps_missing_values_to_null() {
        let row = Row::builder()
            .data(Datum::builder().var_char_value("abc").build())
            .data(Datum::builder().build())
            .build();

        let converted = convert_row(&row);
        assert_eq!(converted, vec![Some("abc".to_string()), None]);
    }

    #[test]
    fn test_header_only_first_page_yields_no_rows() {
        let mut builder = BatchBuilder::new(10);
        ingest_page(&[data_row(&["order_id"])], true, &mut builder);
        assert_eq!(builder.buffered(), 0);
        assert!(builder.finish().is_none());
    }

    #[test]
    fn test_empty_first_page_yields_no_rows() {
        let mut builder = BatchBuilder::new(10);
        ingest_page(&[], true, &mut builder);
        assert!(builder.finish().is_none());
    }

    #[test]
    fn test_header_skipped_on_first_page_only() {
        let mut builder = BatchBuilder::new(10);
        ingest_page(&[data_row(&["order_id"]), data_row(&["a"])], true, &mut builder);
        ingest_page(&[data_row(&["b"])], false, &mut builder);

        assert_eq!(
            staged(&mut builder),
            vec![
                vec![Some("a".to_string())],
                vec![Some("b".to_string())],
            ]
        );
    }

    #[test]
    fn test_row_order_preserved_across_page_boundary() {
        // Batches cut at a chunk boundary that straddles two pages must
        // concatenate back to the full result set in source order.
        let mut builder = BatchBuilder::new(2);
        ingest_page(
            &[data_row(&["h"]), data_row(&["1"]), data_row(&["2"]), data_row(&["3"])],
            true,
            &mut builder,
        );
        ingest_page(&[data_row(&["4"]), data_row(&["5"])], false, &mut builder);

        let rows = staged(&mut builder);
        let values: Vec<_> = rows.iter().filter_map(|r| r[0].clone()).collect();
        assert_eq!(values, vec!["1", "2", "3", "4", "5"]);
    }
}
