use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use tokio::sync::Mutex;

use super::connection::SqliteConnection;
use crate::connection::{Connection, DataSource};
use crate::error::{Result, SqlRecordError};

/// A rusqlite connection shared between the async side and blocking workers.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// Options for a `SQLite` pool.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub pool_size: u32,
    pub busy_timeout: Duration,
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            pool_size: 4,
            busy_timeout: Duration::from_secs(5),
            wal: true,
        }
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Switch the database to write-ahead logging when connecting.
    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

/// bb8 manager for rusqlite connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    options: SqliteOptions,
}

impl SqliteManager {
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = rusqlite::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let options = self.options.clone();
        async move {
            let conn = rusqlite::Connection::open(&options.db_path)?;
            conn.busy_timeout(options.busy_timeout)?;
            if options.wal {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.lock().await.execute_batch("SELECT 1") }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled `SQLite` datasource.
#[derive(Clone)]
pub struct SqliteDataSource {
    pool: Pool<SqliteManager>,
}

impl SqliteDataSource {
    /// Build the pool and check out one connection as a smoke test.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for a zero pool size, and the driver error when
    /// the database cannot be opened.
    pub async fn connect(options: SqliteOptions) -> Result<Self> {
        if options.pool_size == 0 {
            return Err(SqlRecordError::ConfigError(
                "sqlite pool size must be at least 1".to_string(),
            ));
        }
        let path = options.db_path.clone();
        let pool = Pool::builder()
            .max_size(options.pool_size)
            .build(SqliteManager::new(options))
            .await?;
        drop(pool.get().await?);
        tracing::debug!(path = %path, "SQLite pool ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        let conn = self.pool.get_owned().await?;
        Ok(Box::new(SqliteConnection::new(conn)))
    }
}
