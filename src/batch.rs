//! Chunked batch execution.
//!
//! Outside a transaction each chunk is committed on its own, so a failure keeps the chunks
//! that already went through. Inside one, chunks join the open transaction and the
//! coordinator decides.

use crate::connection::Connection;
use crate::dialect::BatchPlan;
use crate::error::{Result, SqlRecordError};
use crate::executor::{batch_on, statements_on};
use crate::record::Record;
use crate::scope::{ConnectionScope, Route};
use crate::types::Value;

enum BatchWork<'w> {
    Rows { sql: &'w str, rows: &'w [Vec<Value>] },
    Statements(&'w [String]),
}

impl BatchWork<'_> {
    fn len(&self) -> usize {
        match self {
            BatchWork::Rows { rows, .. } => rows.len(),
            BatchWork::Statements(statements) => statements.len(),
        }
    }

    async fn run_chunk(
        &self,
        scope: &ConnectionScope,
        conn: &mut dyn Connection,
        start: usize,
        end: usize,
    ) -> Result<Vec<u64>> {
        match self {
            BatchWork::Rows { sql, rows } => batch_on(scope, conn, sql, &rows[start..end]).await,
            BatchWork::Statements(statements) => {
                statements_on(scope, conn, &statements[start..end]).await
            }
        }
    }
}

pub struct BatchExecutor<'a> {
    scope: &'a ConnectionScope,
}

impl<'a> BatchExecutor<'a> {
    #[must_use]
    pub fn new(scope: &'a ConnectionScope) -> Self {
        Self { scope }
    }

    /// Execute `sql` once per parameter row, `batch_size` rows per round trip. Returns one
    /// affected count per row, in input order.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when `batch_size` is zero, and the first
    /// failing chunk's statement error otherwise.
    pub async fn batch(&self, sql: &str, rows: &[Vec<Value>], batch_size: usize) -> Result<Vec<u64>> {
        self.run(BatchWork::Rows { sql, rows }, batch_size).await
    }

    /// Execute parameterless statements in chunks of `batch_size`.
    ///
    /// # Errors
    /// Same as [`BatchExecutor::batch`].
    pub async fn batch_statements(&self, statements: &[String], batch_size: usize) -> Result<Vec<u64>> {
        self.run(BatchWork::Statements(statements), batch_size).await
    }

    /// Bind every record through `plan` and execute the rows as one batch.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ParameterError` when a record lacks a planned column, before
    /// anything is executed.
    pub async fn batch_records(
        &self,
        plan: &BatchPlan,
        records: &[Record],
        batch_size: usize,
    ) -> Result<Vec<u64>> {
        let rows = records
            .iter()
            .map(|r| plan.bind(r))
            .collect::<Result<Vec<_>>>()?;
        self.batch(&plan.sql, &rows, batch_size).await
    }

    async fn run(&self, work: BatchWork<'_>, batch_size: usize) -> Result<Vec<u64>> {
        if batch_size == 0 {
            return Err(SqlRecordError::ConfigError(
                "batch size must be at least 1".to_string(),
            ));
        }
        if work.len() == 0 {
            return Ok(Vec::new());
        }

        let mut lease = self.scope.lease(Route::Write).await?;
        let commit_chunks = !lease.is_confined();
        let outcome = if commit_chunks {
            self.run_committing(&work, batch_size, lease.conn()).await
        } else {
            self.run_chunks(&work, batch_size, lease.conn()).await
        };
        lease.finish(outcome).await
    }

    async fn run_chunks(
        &self,
        work: &BatchWork<'_>,
        batch_size: usize,
        conn: &mut dyn Connection,
    ) -> Result<Vec<u64>> {
        let total = work.len();
        let mut counts = Vec::with_capacity(total);
        let mut start = 0;
        while start < total {
            let end = (start + batch_size).min(total);
            counts.extend(work.run_chunk(self.scope, conn, start, end).await?);
            start = end;
        }
        Ok(counts)
    }

    async fn run_committing(
        &self,
        work: &BatchWork<'_>,
        batch_size: usize,
        conn: &mut dyn Connection,
    ) -> Result<Vec<u64>> {
        let auto_commit = conn.auto_commit();
        conn.set_auto_commit(false).await?;

        let total = work.len();
        let mut counts = Vec::with_capacity(total);
        let mut start = 0;
        let mut outcome = Ok(());
        while start < total {
            let end = (start + batch_size).min(total);
            let chunk = match work.run_chunk(self.scope, conn, start, end).await {
                Ok(chunk) => conn.commit().await.map(|()| chunk),
                Err(e) => Err(e),
            };
            match chunk {
                Ok(chunk) => counts.extend(chunk),
                Err(e) => {
                    if let Err(rollback_err) = conn.rollback().await {
                        tracing::error!(error = %rollback_err, "Batch rollback failed");
                    }
                    outcome = Err(e);
                    break;
                }
            }
            tracing::debug!(scope = self.scope.name(), done = end, total, "Batch chunk committed");
            start = end;
        }

        if let Err(e) = conn.set_auto_commit(auto_commit).await {
            tracing::warn!(error = %e, "Failed to restore autocommit after batch");
        }
        outcome.map(|()| counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDataSource, MockEvent};
    use crate::tx::TransactionCoordinator;
    use crate::types::{DialectKind, IsolationLevel};

    fn scope(ds: &MockDataSource) -> std::sync::Arc<ConnectionScope> {
        ConnectionScope::builder("main")
            .datasource(ds.clone())
            .dialect_kind(DialectKind::Sqlite)
            .build()
            .unwrap()
    }

    fn rows(n: i64) -> Vec<Vec<Value>> {
        (0..n).map(|i| vec![Value::Long(i)]).collect()
    }

    fn batch_sizes(ds: &MockDataSource) -> Vec<usize> {
        ds.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Batch { size } => Some(size),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn chunks_by_batch_size_and_commits_each() {
        let ds = MockDataSource::new();
        let scope = scope(&ds);
        let counts = BatchExecutor::new(&scope)
            .batch("insert into t(n) values(?)", &rows(5), 2)
            .await
            .unwrap();
        assert_eq!(counts.len(), 5);
        assert_eq!(batch_sizes(&ds), vec![2, 2, 1]);
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Commit)), 3);
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Acquire)), 1);
        let events = ds.events();
        assert!(events.contains(&MockEvent::SetAutoCommit(false)));
        assert!(events.contains(&MockEvent::SetAutoCommit(true)));
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected_and_empty_input_is_a_no_op() {
        let ds = MockDataSource::new();
        let scope = scope(&ds);
        let executor = BatchExecutor::new(&scope);
        assert!(matches!(
            executor.batch("insert into t(n) values(?)", &rows(3), 0).await,
            Err(SqlRecordError::ConfigError(_))
        ));
        assert!(executor.batch("insert into t(n) values(?)", &[], 10).await.unwrap().is_empty());
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Acquire)), 0);
    }

    #[tokio::test]
    async fn failing_chunk_rolls_back_and_keeps_earlier_commits() {
        let ds = MockDataSource::new();
        ds.fail_batch_at(2);
        let scope = scope(&ds);
        let err = BatchExecutor::new(&scope)
            .batch("insert into t(n) values(?)", &rows(6), 2)
            .await
            .unwrap_err();
        assert_eq!(err.sql(), Some("insert into t(n) values(?)"));
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Commit)), 1);
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Rollback)), 1);
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Close)), 1);
    }

    #[tokio::test]
    async fn inside_a_transaction_chunks_are_not_committed() {
        let ds = MockDataSource::new();
        let scope = scope(&ds);
        TransactionCoordinator::new(&scope)
            .run(IsolationLevel::ReadCommitted, || async {
                BatchExecutor::new(&scope)
                    .batch("insert into t(n) values(?)", &rows(5), 2)
                    .await?;
                Ok(true)
            })
            .await
            .unwrap();
        assert_eq!(batch_sizes(&ds), vec![2, 2, 1]);
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Commit)), 1);
    }

    #[tokio::test]
    async fn statements_are_chunked_too() {
        let ds = MockDataSource::new();
        let scope = scope(&ds);
        let statements: Vec<String> = (0..3).map(|i| format!("delete from t where n = {i}")).collect();
        let counts = BatchExecutor::new(&scope)
            .batch_statements(&statements, 2)
            .await
            .unwrap();
        assert_eq!(counts, vec![1, 1, 1]);
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Commit)), 2);
    }
}
