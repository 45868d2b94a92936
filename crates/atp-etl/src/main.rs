//! ATP ETL - warehouse pipeline runner

use atp_common::logging::{init_logging, LogConfig, LogLevel};
use atp_common::{AtpError, Result};
use atp_etl::athena::QueryEngine;
use atp_etl::config::{Config, DEFAULT_CHUNK_SIZE};
use atp_etl::pipeline::{self, RunOptions};
use atp_etl::pipelines::{logistics, orders};
use atp_etl::warehouse::Warehouse;
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::process;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "atp-etl")]
#[command(author, version, about = "ATP warehouse pipeline runner")]
struct Cli {
    /// Pipeline to run
    #[command(subcommand)]
    pipeline: Pipeline,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Pipeline {
    /// Load today's logistics fulfillment updates
    Logistics {
        /// Maximum rows per staged batch
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Keep loading after a failed batch instead of aborting the run
        #[arg(long)]
        allow_partial: bool,
    },

    /// Load one day of order-level updates
    Orders {
        /// Target date (YYYY-MM-DD); defaults to today
        target_date: Option<String>,

        /// Maximum rows per staged batch
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Keep loading after a failed batch instead of aborting the run
        #[arg(long)]
        allow_partial: bool,

        /// Also top up the dimension tables from the staged rows
        #[arg(long)]
        dimensions: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag; environment overrides win
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let base = LogConfig {
        level: log_level,
        log_file_prefix: "atp-etl".to_string(),
        ..LogConfig::default()
    };
    let log_config = match LogConfig::from_env_or(base.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring invalid LOG_* environment: {}", e);
            base
        },
    };
    let _ = init_logging(&log_config);

    if let Err(e) = execute(&cli).await {
        error!(error = %e, "pipeline run failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute(cli: &Cli) -> Result<()> {
    let config = Config::load()?;
    let engine = QueryEngine::new(&config.athena);
    let warehouse = Warehouse::new(&config.warehouse);

    match &cli.pipeline {
        Pipeline::Logistics {
            chunk_size,
            allow_partial,
        } => {
            let def = logistics::pipeline();
            let opts = RunOptions {
                chunk_size: *chunk_size,
                allow_partial: *allow_partial,
            };
            pipeline::run(&engine, &warehouse, &def, &opts).await?;
        },
        Pipeline::Orders {
            target_date,
            chunk_size,
            allow_partial,
            dimensions,
        } => {
            let date = resolve_target_date(target_date.as_deref())?;
            info!(target_date = %date, "processing order data");

            let def = orders::pipeline(date);
            let opts = RunOptions {
                chunk_size: *chunk_size,
                allow_partial: *allow_partial,
            };
            pipeline::run(&engine, &warehouse, &def, &opts).await?;

            if *dimensions {
                orders::refresh_dimensions(&warehouse).await?;
            }
        },
    }

    info!("pipeline run complete");
    Ok(())
}

/// Validate an optional `YYYY-MM-DD` argument; default to today.
fn resolve_target_date(arg: Option<&str>) -> Result<NaiveDate> {
    match arg {
        None => Ok(Local::now().date_naive()),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            AtpError::Config(format!(
                "invalid date '{}': expected YYYY-MM-DD format",
                s
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target_date_accepts_iso_dates() {
        let date = resolve_target_date(Some("2025-08-29")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 8, 29).unwrap());
    }

    #[test]
    fn test_resolve_target_date_rejects_malformed_input() {
        assert!(resolve_target_date(Some("29-08-2025")).is_err());
        assert!(resolve_target_date(Some("2025-13-01")).is_err());
        assert!(resolve_target_date(Some("not-a-date")).is_err());
    }

    #[test]
    fn test_resolve_target_date_defaults_to_today() {
        let date = resolve_target_date(None).unwrap();
        assert_eq!(date, Local::now().date_naive());
    }
}
