use thiserror::Error;

use crate::types::Value;

#[derive(Debug, Error)]
pub enum SqlRecordError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PoolErrorPostgres(#[from] deadpool_postgres::PoolError),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    PoolErrorSqlite(#[from] bb8::RunError<rusqlite::Error>),

    /// A statement failed. Carries the SQL text and the bound parameters.
    #[error("SQL statement failed: {source}; sql: {sql}; params: {params:?}")]
    Statement {
        sql: String,
        params: Vec<Value>,
        #[source]
        source: Box<SqlRecordError>,
    },

    /// Raised by a nested transaction whose unit of work returned `false`.
    ///
    /// Unwinds to the transaction that owns the connection and forces it to roll back.
    #[error("nested transaction returned false; the enclosing transaction is rolled back")]
    NestedTransactionRollback,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

pub type Result<T, E = SqlRecordError> = std::result::Result<T, E>;

impl SqlRecordError {
    /// Attach statement context to an error raised while preparing, binding or executing `sql`.
    ///
    /// Errors that already carry context, and the nested-rollback signal, pass through untouched.
    #[must_use]
    pub fn with_statement(self, sql: &str, params: &[Value]) -> Self {
        match self {
            SqlRecordError::Statement { .. } | SqlRecordError::NestedTransactionRollback => self,
            other => SqlRecordError::Statement {
                sql: sql.to_owned(),
                params: params.to_vec(),
                source: Box::new(other),
            },
        }
    }

    /// True for the distinguished nested-transaction rollback signal.
    #[must_use]
    pub fn is_nested_rollback(&self) -> bool {
        matches!(self, SqlRecordError::NestedTransactionRollback)
    }

    /// SQL text of the failing statement, if this error carries one.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            SqlRecordError::Statement { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Bound parameters of the failing statement, if this error carries them.
    #[must_use]
    pub fn params(&self) -> Option<&[Value]> {
        match self {
            SqlRecordError::Statement { params, .. } => Some(params),
            _ => None,
        }
    }
}
