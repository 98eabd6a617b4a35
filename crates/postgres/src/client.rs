//! PostgreSQL connection wrapper.

use bridge_core::{Error, KeyMode, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use telemetry::health;
use tracing::{error, info, warn};

use crate::config::PostgresConfig;
use crate::schema::{self, TableNames};

/// Single-connection store shared by the pipeline.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    tables: TableNames,
    key_mode: KeyMode,
}

impl PgStore {
    /// Opens the connection. Failing here is fatal for the bridge.
    pub async fn open(config: &PostgresConfig) -> Result<Self> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.connect_timeout())
            .connect_with(config.connect_options())
            .await
            .map_err(|e| {
                health().postgres.set_unhealthy(e.to_string());
                Error::storage(format!(
                    "cannot connect to {}:{}: {}",
                    config.hostname, config.port, e
                ))
            })?;

        health().postgres.set_healthy();
        info!(
            hostname = %config.hostname,
            port = config.port,
            prefix = %config.prefix,
            key_mode = ?config.key_mode,
            "Connected to PostgreSQL"
        );

        Ok(Self::with_pool(pool, &config.prefix, config.key_mode))
    }

    /// Wraps an existing pool.
    pub fn with_pool(pool: PgPool, prefix: &str, key_mode: KeyMode) -> Self {
        Self {
            pool,
            tables: TableNames::new(prefix),
            key_mode,
        }
    }

    /// Creates missing tables and indexes.
    ///
    /// A failing statement is logged and the remaining ones still run.
    /// Returns the number of failed statements.
    pub async fn init_schema(&self) -> usize {
        let mut failures = 0;
        for ddl in schema::all_statements(&self.tables, self.key_mode) {
            if let Err(e) = sqlx::query(&ddl).execute(&self.pool).await {
                failures += 1;
                error!(error = %e, statement = %ddl, "Schema statement failed");
            }
        }

        if failures > 0 {
            warn!(failures, "PostgreSQL schema initialized with errors");
        } else {
            info!("PostgreSQL schema initialized");
        }
        failures
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection closed");
    }
}
