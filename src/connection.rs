//! Driver-facing seams: where connections come from and what a connection must do.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use crate::cursor::ResultCursor;
use crate::error::Result;
use crate::types::{IsolationLevel, Value};

/// Boxed future borrowed from a connection, returned by raw connection callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies connections. Pooling and health checks belong to the implementation.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// # Errors
    /// Returns a connection or pool error when no connection can be obtained.
    async fn acquire(&self) -> Result<Box<dyn Connection>>;
}

/// Outcome of an INSERT with generated-key retrieval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    pub affected: u64,
    /// Generated values in the order of the requested key columns. Drivers that can only
    /// report a single row id return one value.
    pub generated_keys: Vec<Value>,
}

/// A live database connection.
///
/// Parameters arrive already coerced by the active dialect; drivers only map the remaining
/// [`Value`] variants onto their native types. Statements use `?` placeholders.
#[async_trait]
pub trait Connection: Send {
    /// Run a query and return its open cursor. The cursor borrows the connection, and the
    /// statement is released when the cursor is dropped, whether or not it was read to the end.
    async fn query<'c>(
        &'c mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Box<dyn ResultCursor + 'c>>;

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute an INSERT and read back the values generated for `key_columns`.
    async fn execute_insert(
        &mut self,
        sql: &str,
        params: &[Value],
        key_columns: &[String],
    ) -> Result<InsertOutcome>;

    /// Execute one statement once per parameter row as a single batch.
    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<Vec<u64>>;

    /// Execute a list of parameterless statements as one batch.
    async fn execute_statements(&mut self, statements: &[String]) -> Result<Vec<u64>> {
        let mut counts = Vec::with_capacity(statements.len());
        for sql in statements {
            counts.push(self.execute(sql, &[]).await?);
        }
        Ok(counts)
    }

    /// Execute a multi-statement script without parameters.
    async fn execute_script(&mut self, script: &str) -> Result<()>;

    fn auto_commit(&self) -> bool;

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    fn isolation_level(&self) -> IsolationLevel;

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Give the connection back to its source. The connection is unusable afterwards.
    async fn close(&mut self) -> Result<()>;

    /// Hand a statement timeout to the driver. Drivers without one ignore it.
    fn set_query_timeout(&mut self, _timeout: Option<Duration>) {}
}

/// Autocommit emulation for drivers that only speak `BEGIN`/`COMMIT`.
///
/// With autocommit off, a transaction is opened lazily in front of the next statement and
/// closed by `commit`/`rollback`. Isolation changes requested while a transaction is open
/// take effect from the next one.
#[derive(Debug, Clone)]
pub struct AutoCommitState {
    auto_commit: bool,
    in_transaction: bool,
    isolation: IsolationLevel,
}

impl Default for AutoCommitState {
    fn default() -> Self {
        Self {
            auto_commit: true,
            in_transaction: false,
            isolation: IsolationLevel::default(),
        }
    }
}

/// What a driver must run before the next statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginAction {
    None,
    Begin(IsolationLevel),
}

/// What a driver must run to end the current unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndAction {
    None,
    Commit,
    Rollback,
}

impl AutoCommitState {
    #[must_use]
    pub fn new(isolation: IsolationLevel) -> Self {
        Self {
            isolation,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn set_isolation(&mut self, level: IsolationLevel) {
        if self.in_transaction && level != self.isolation {
            tracing::debug!(
                from = ?self.isolation,
                to = ?level,
                "Isolation change deferred until the open transaction ends"
            );
        }
        self.isolation = level;
    }

    /// Call before each statement; the driver runs `BEGIN` when asked to.
    pub fn before_statement(&mut self) -> BeginAction {
        if self.auto_commit || self.in_transaction {
            BeginAction::None
        } else {
            self.in_transaction = true;
            BeginAction::Begin(self.isolation)
        }
    }

    /// Switching autocommit back on commits an open transaction, as JDBC-style drivers do.
    pub fn set_auto_commit(&mut self, auto_commit: bool) -> EndAction {
        self.auto_commit = auto_commit;
        if auto_commit { self.end(EndAction::Commit) } else { EndAction::None }
    }

    pub fn commit(&mut self) -> EndAction {
        self.end(EndAction::Commit)
    }

    pub fn rollback(&mut self) -> EndAction {
        self.end(EndAction::Rollback)
    }

    fn end(&mut self, action: EndAction) -> EndAction {
        if std::mem::take(&mut self.in_transaction) {
            action
        } else {
            EndAction::None
        }
    }
}
