//! Configuration management
//!
//! Everything is loaded from environment variables (with `.env` support
//! via dotenvy). The variable names match what the scheduler already
//! exports for these pipelines.

use atp_common::{AtpError, Result};
use sqlx::postgres::PgConnectOptions;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default maximum number of rows per staged batch.
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Default interval between Athena query-state polls, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default overall deadline for one Athena query, in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 900;

/// Default warehouse host.
pub const DEFAULT_DB_HOST: &str = "127.0.0.1";

/// Default warehouse port.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub athena: AthenaConfig,
    pub warehouse: WarehouseConfig,
}

/// Source query engine (Athena) configuration
#[derive(Debug, Clone)]
pub struct AthenaConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// S3 location Athena writes query results to
    pub output_location: String,
    /// Glue catalog database the shared views live in
    pub database: String,
    pub poll_interval_secs: u64,
    pub query_timeout_secs: u64,
}

/// Target warehouse (PostgreSQL) configuration
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Required: `AWS_ACCESS_KEY`, `AWS_SECRET_KEY`, `S3_STAGING_DIR`,
    /// `AWS_REGION`, `DATABASE_NAME`, `DB_NAME`, `DB_USER`, `DB_PWD`.
    /// Optional: `DB_HOST`, `DB_PORT`, `ATHENA_POLL_INTERVAL`,
    /// `ATHENA_QUERY_TIMEOUT`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            athena: AthenaConfig {
                access_key: required("AWS_ACCESS_KEY")?,
                secret_key: required("AWS_SECRET_KEY")?,
                region: required("AWS_REGION")?,
                output_location: required("S3_STAGING_DIR")?,
                database: required("DATABASE_NAME")?,
                poll_interval_secs: std::env::var("ATHENA_POLL_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                query_timeout_secs: std::env::var("ATHENA_QUERY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            },
            warehouse: WarehouseConfig {
                host: std::env::var("DB_HOST").unwrap_or_else(|_| DEFAULT_DB_HOST.to_string()),
                port: std::env::var("DB_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DB_PORT),
                database: required("DB_NAME")?,
                user: required("DB_USER")?,
                password: required("DB_PWD")?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.athena.output_location.starts_with("s3://") {
            return Err(AtpError::Config(format!(
                "S3_STAGING_DIR must be an s3:// URI, got '{}'",
                self.athena.output_location
            )));
        }

        if self.athena.poll_interval_secs == 0 {
            return Err(AtpError::Config(
                "ATHENA_POLL_INTERVAL must be greater than 0".to_string(),
            ));
        }

        if self.athena.query_timeout_secs < self.athena.poll_interval_secs {
            return Err(AtpError::Config(format!(
                "ATHENA_QUERY_TIMEOUT ({}) cannot be shorter than ATHENA_POLL_INTERVAL ({})",
                self.athena.query_timeout_secs, self.athena.poll_interval_secs
            )));
        }

        if self.warehouse.port == 0 {
            return Err(AtpError::Config(
                "DB_PORT must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl WarehouseConfig {
    /// Connection options for the warehouse.
    ///
    /// Built field-by-field rather than as a URL so passwords never need
    /// escaping.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| AtpError::Config(format!("missing environment variable {}", name)))
        .and_then(|v| {
            if v.trim().is_empty() {
                Err(AtpError::Config(format!(
                    "environment variable {} is empty",
                    name
                )))
            } else {
                Ok(v)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            athena: AthenaConfig {
                access_key: "AKIATEST".to_string(),
                secret_key: "secret".to_string(),
                region: "ap-south-1".to_string(),
                output_location: "s3://atp-query-results/".to_string(),
                database: "default".to_string(),
                poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
                query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            },
            warehouse: WarehouseConfig {
                host: DEFAULT_DB_HOST.to_string(),
                port: DEFAULT_DB_PORT,
                database: "atp".to_string(),
                user: "atp".to_string(),
                password: "p@ss:word/with?chars".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_staging_dir_must_be_s3_uri() {
        let mut config = sample_config();
        config.athena.output_location = "/tmp/results".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_shorter_than_poll_interval_rejected() {
        let mut config = sample_config();
        config.athena.poll_interval_secs = 30;
        config.athena.query_timeout_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_options_carry_credentials() {
        let options = sample_config().warehouse.connect_options();
        // Host and database survive; the password with URL-hostile
        // characters needed no escaping.
        assert_eq!(options.get_host(), DEFAULT_DB_HOST);
        assert_eq!(options.get_database(), Some("atp"));
    }
}
