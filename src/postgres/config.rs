use async_trait::async_trait;
use deadpool_postgres::{Config as PgConfig, Pool, Runtime};
use tokio_postgres::NoTls;

use super::connection::PgConnection;
use crate::connection::{Connection, DataSource};
use crate::error::{Result, SqlRecordError};

/// Pooled Postgres datasource.
#[derive(Clone)]
pub struct PostgresDataSource {
    pool: Pool,
}

impl PostgresDataSource {
    /// Build the pool from a deadpool `Config` and check out one client as a smoke test.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` if required config fields are missing or
    /// `SqlRecordError::ConnectionError` if pool creation fails.
    pub async fn connect(pg_config: PgConfig) -> Result<Self> {
        validate(&pg_config)?;
        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                SqlRecordError::ConnectionError(format!("Failed to create Postgres pool: {e}"))
            })?;
        drop(pool.get().await?);
        tracing::debug!(
            host = ?pg_config.host,
            dbname = ?pg_config.dbname,
            "Postgres pool ready"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }
}

fn validate(pg_config: &PgConfig) -> Result<()> {
    let required = [
        ("dbname", pg_config.dbname.is_none()),
        ("host", pg_config.host.is_none()),
        ("port", pg_config.port.is_none()),
        ("user", pg_config.user.is_none()),
    ];
    match required.iter().find(|(_, missing)| *missing) {
        Some((field, _)) => Err(SqlRecordError::ConfigError(format!("{field} is required"))),
        None => Ok(()),
    }
}

#[async_trait]
impl DataSource for PostgresDataSource {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        let client = self.pool.get().await?;
        Ok(Box::new(PgConnection::new(client)))
    }
}
