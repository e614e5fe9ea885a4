//! Statement execution: lease a connection, bind through the dialect, run, materialize,
//! report, release.
//!
//! The `*_on` functions run against a connection the caller already holds, so multi-step
//! operations (pagination, batches) use a single lease.

use std::time::Instant;

use chrono::Utc;

use crate::connection::{Connection, InsertOutcome};
use crate::cursor::ColumnInfo;
use crate::error::{Result, SqlRecordError};
use crate::record::Record;
use crate::record_builder::RecordBuilder;
use crate::scope::{ConnectionScope, Route};
use crate::types::Value;

pub mod stats;

use stats::{SqlStat, StatementKind, emit};

/// Runs single statements on a scope, inside its current transaction if there is one.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor<'a> {
    scope: &'a ConnectionScope,
}

impl<'a> QueryExecutor<'a> {
    #[must_use]
    pub fn new(scope: &'a ConnectionScope) -> Self {
        Self { scope }
    }

    /// # Errors
    /// Returns `SqlRecordError::Statement` for driver failures, or connection errors.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        let mut lease = self.scope.lease(Route::Read).await?;
        let outcome = query_on(self.scope, lease.conn(), sql, params).await;
        lease.finish(outcome).await
    }

    /// Stream rows to `visit` until it returns `false`. Returns the number of rows visited.
    ///
    /// # Errors
    /// Returns `SqlRecordError::Statement` for driver failures, or connection errors.
    pub async fn each<F>(&self, sql: &str, params: &[Value], mut visit: F) -> Result<usize>
    where
        F: FnMut(Record) -> bool + Send,
    {
        let mut lease = self.scope.lease(Route::Read).await?;
        let outcome = each_on(self.scope, lease.conn(), sql, params, &mut visit).await;
        lease.finish(outcome).await
    }

    /// # Errors
    /// Returns `SqlRecordError::Statement` for driver failures, or connection errors.
    pub async fn update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut lease = self.scope.lease(Route::Write).await?;
        let outcome = update_on(self.scope, lease.conn(), sql, params).await;
        lease.finish(outcome).await
    }

    /// # Errors
    /// Returns `SqlRecordError::Statement` for driver failures, or connection errors.
    pub async fn insert(
        &self,
        sql: &str,
        params: &[Value],
        key_columns: &[String],
    ) -> Result<InsertOutcome> {
        let mut lease = self.scope.lease(Route::Write).await?;
        let outcome = insert_on(self.scope, lease.conn(), sql, params, key_columns).await;
        lease.finish(outcome).await
    }

    /// Column metadata of `sql`'s result.
    ///
    /// # Errors
    /// Returns `SqlRecordError::Statement` for driver failures, or connection errors.
    pub async fn describe(&self, sql: &str) -> Result<Vec<ColumnInfo>> {
        let mut lease = self.scope.lease(Route::Read).await?;
        let outcome = describe_on(self.scope, lease.conn(), sql).await;
        lease.finish(outcome).await
    }

    /// # Errors
    /// Returns `SqlRecordError::Statement` for driver failures, or connection errors.
    pub async fn script(&self, script: &str) -> Result<()> {
        let mut lease = self.scope.lease(Route::Write).await?;
        let started = Started::now(self.scope, script, &[]);
        let outcome = lease
            .conn()
            .execute_script(script)
            .await
            .map_err(|e| e.with_statement(script, &[]));
        started.finish(StatementKind::Script, outcome.as_ref().map(|_| 0));
        lease.finish(outcome).await
    }
}

/// Timing and logging around one statement.
struct Started<'s> {
    scope: &'s ConnectionScope,
    sql: &'s str,
    params: &'s [Value],
    start_time: chrono::DateTime<Utc>,
    instant: Instant,
}

impl<'s> Started<'s> {
    fn now(scope: &'s ConnectionScope, sql: &'s str, params: &'s [Value]) -> Self {
        if scope.show_sql() {
            tracing::debug!(scope = scope.name(), sql = sql, params = ?params, "Executing SQL");
        }
        Self {
            scope,
            sql,
            params,
            start_time: Utc::now(),
            instant: Instant::now(),
        }
    }

    fn finish(self, kind: StatementKind, outcome: std::result::Result<u64, &SqlRecordError>) {
        let elapsed = self.instant.elapsed();
        let row_count = match outcome {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(scope = self.scope.name(), error = %e, "SQL failed");
                0
            }
        };
        if let Some(sink) = self.scope.stats() {
            emit(
                sink,
                &SqlStat {
                    name: self.scope.name(),
                    kind,
                    sql: self.sql,
                    params: self.params,
                    row_count,
                    start_time: self.start_time,
                    elapsed,
                    synchronous: true,
                },
            );
        }
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

pub(crate) async fn query_on(
    scope: &ConnectionScope,
    conn: &mut dyn Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Record>> {
    let bound = scope.dialect().fill_statement(params);
    let builder = RecordBuilder::new(scope.column_case());
    let started = Started::now(scope, sql, params);
    let outcome = async {
        let mut cursor = conn.query(sql, &bound).await?;
        builder.build(cursor.as_mut()).await
    }
    .await
    .map_err(|e| e.with_statement(sql, params));
    started.finish(StatementKind::Query, outcome.as_ref().map(|r| count(r.len())));
    outcome
}

pub(crate) async fn each_on(
    scope: &ConnectionScope,
    conn: &mut dyn Connection,
    sql: &str,
    params: &[Value],
    visit: &mut (dyn FnMut(Record) -> bool + Send),
) -> Result<usize> {
    let bound = scope.dialect().fill_statement(params);
    let builder = RecordBuilder::new(scope.column_case());
    let started = Started::now(scope, sql, params);
    let outcome = async {
        let mut cursor = conn.query(sql, &bound).await?;
        builder.build_each(cursor.as_mut(), visit).await
    }
    .await
    .map_err(|e| e.with_statement(sql, params));
    started.finish(StatementKind::Query, outcome.as_ref().map(|n| count(*n)));
    outcome
}

pub(crate) async fn update_on(
    scope: &ConnectionScope,
    conn: &mut dyn Connection,
    sql: &str,
    params: &[Value],
) -> Result<u64> {
    let bound = scope.dialect().fill_statement(params);
    let started = Started::now(scope, sql, params);
    let outcome = conn
        .execute(sql, &bound)
        .await
        .map_err(|e| e.with_statement(sql, params));
    started.finish(StatementKind::Update, outcome.as_ref().copied());
    outcome
}

pub(crate) async fn insert_on(
    scope: &ConnectionScope,
    conn: &mut dyn Connection,
    sql: &str,
    params: &[Value],
    key_columns: &[String],
) -> Result<InsertOutcome> {
    let bound = scope.dialect().fill_statement(params);
    let started = Started::now(scope, sql, params);
    let outcome = conn
        .execute_insert(sql, &bound, key_columns)
        .await
        .map_err(|e| e.with_statement(sql, params));
    started.finish(StatementKind::Insert, outcome.as_ref().map(|o| o.affected));
    outcome
}

/// One batch execution of `sql` over `rows`, each row bound like a single statement.
pub(crate) async fn batch_on(
    scope: &ConnectionScope,
    conn: &mut dyn Connection,
    sql: &str,
    rows: &[Vec<Value>],
) -> Result<Vec<u64>> {
    let dialect = scope.dialect();
    let bound: Vec<Vec<Value>> = rows.iter().map(|r| dialect.fill_statement(r)).collect();
    let first = rows.first().map(Vec::as_slice).unwrap_or_default();
    let started = Started::now(scope, sql, first);
    let outcome = conn
        .execute_batch(sql, &bound)
        .await
        .map_err(|e| e.with_statement(sql, first));
    started.finish(StatementKind::Batch, outcome.as_ref().map(|c| c.iter().sum()));
    outcome
}

pub(crate) async fn statements_on(
    scope: &ConnectionScope,
    conn: &mut dyn Connection,
    statements: &[String],
) -> Result<Vec<u64>> {
    let label = statements.first().map(String::as_str).unwrap_or_default();
    let started = Started::now(scope, label, &[]);
    let outcome = conn
        .execute_statements(statements)
        .await
        .map_err(|e| e.with_statement(label, &[]));
    started.finish(StatementKind::Batch, outcome.as_ref().map(|c| c.iter().sum()));
    outcome
}

pub(crate) async fn describe_on(
    scope: &ConnectionScope,
    conn: &mut dyn Connection,
    sql: &str,
) -> Result<Vec<ColumnInfo>> {
    let started = Started::now(scope, sql, &[]);
    let outcome = async {
        let cursor = conn.query(sql, &[]).await?;
        Ok::<_, SqlRecordError>(cursor.columns().to_vec())
    }
    .await
    .map_err(|e| e.with_statement(sql, &[]));
    started.finish(StatementKind::Describe, outcome.as_ref().map(|_| 0));
    outcome
}
