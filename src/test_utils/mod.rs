//! Scripted in-memory datasource for exercising scopes without a database.
//!
//! Every connection handed out by a [`MockDataSource`] records what it is asked to do into
//! a shared event log, so tests can assert on acquisitions, commits, batches and the bound
//! parameters. Query results are scripted by SQL substring with [`MockDataSource::respond`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::connection::{Connection, DataSource, InsertOutcome};
use crate::cursor::{ColumnInfo, RawValue, ResultCursor, VecCursor};
use crate::error::{Result, SqlRecordError};
use crate::types::{IsolationLevel, SqlType, Value};

/// One thing a mock connection was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Acquire,
    Close,
    Query { sql: String, params: Vec<Value> },
    Execute { sql: String, params: Vec<Value> },
    Insert {
        sql: String,
        params: Vec<Value>,
        key_columns: Vec<String>,
    },
    Batch { size: usize },
    Script(String),
    SetAutoCommit(bool),
    SetIsolation(IsolationLevel),
    Commit,
    Rollback,
}

struct Response {
    needle: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Default)]
struct MockState {
    events: Vec<MockEvent>,
    responses: Vec<Response>,
    failing: Vec<String>,
    fail_close: bool,
    fail_commit: bool,
    fail_rollback: bool,
    fail_batch_at: Option<usize>,
    batches: usize,
    next_key: i64,
    undrained: usize,
}

/// A datasource whose connections share one scripted state. Clones share it too.
#[derive(Clone, Default)]
pub struct MockDataSource {
    state: Arc<Mutex<MockState>>,
}

impl MockDataSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Queries whose SQL contains `needle` return `rows`. The first matching script wins.
    pub fn respond(&self, needle: &str, columns: Vec<&str>, rows: Vec<Vec<Value>>) {
        self.state().responses.push(Response {
            needle: needle.to_lowercase(),
            columns: columns.into_iter().map(str::to_string).collect(),
            rows,
        });
    }

    /// Any statement whose SQL contains `needle` fails.
    pub fn fail_on(&self, needle: &str) {
        self.state().failing.push(needle.to_lowercase());
    }

    pub fn fail_close(&self) {
        self.state().fail_close = true;
    }

    pub fn fail_commit(&self) {
        self.state().fail_commit = true;
    }

    pub fn fail_rollback(&self) {
        self.state().fail_rollback = true;
    }

    /// The `n`th batch execution (1-based) fails.
    pub fn fail_batch_at(&self, n: usize) {
        self.state().fail_batch_at = Some(n);
    }

    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    pub fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.state().events.iter().filter(|e| pred(e)).count()
    }

    /// Rows scripted for queries that were left unread when their cursor was released.
    #[must_use]
    pub fn undrained_rows(&self) -> usize {
        self.state().undrained
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        self.state().events.push(MockEvent::Acquire);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            auto_commit: true,
            isolation: IsolationLevel::default(),
            closed: false,
        }))
    }
}

/// Scripted rows; whatever is left unread when it is dropped counts as undrained.
struct MockCursor {
    rows: VecCursor,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl ResultCursor for MockCursor {
    fn columns(&self) -> &[ColumnInfo] {
        self.rows.columns()
    }

    async fn next_row(&mut self) -> Result<Option<Vec<RawValue>>> {
        self.rows.next_row().await
    }
}

impl Drop for MockCursor {
    fn drop(&mut self) {
        lock(&self.state).undrained += self.rows.remaining();
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    auto_commit: bool,
    isolation: IsolationLevel,
    closed: bool,
}

impl MockConnection {
    fn record(&self, event: MockEvent) -> Result<()> {
        if self.closed {
            return Err(SqlRecordError::ConnectionError(
                "mock connection already closed".to_string(),
            ));
        }
        lock(&self.state).events.push(event);
        Ok(())
    }

    fn check(&self, sql: &str) -> Result<()> {
        let lowered = sql.to_lowercase();
        if lock(&self.state).failing.iter().any(|n| lowered.contains(n)) {
            return Err(SqlRecordError::ExecutionError(format!(
                "mock failure for: {sql}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query<'c>(
        &'c mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Box<dyn ResultCursor + 'c>> {
        self.record(MockEvent::Query {
            sql: sql.to_string(),
            params: params.to_vec(),
        })?;
        self.check(sql)?;
        let rows = {
            let state = lock(&self.state);
            let lowered = sql.to_lowercase();
            match state.responses.iter().find(|r| lowered.contains(&r.needle)) {
                Some(response) => VecCursor::new(
                    response
                        .columns
                        .iter()
                        .map(|c| ColumnInfo::new(c.clone(), SqlType::Unknown, "mock"))
                        .collect(),
                    response
                        .rows
                        .iter()
                        .map(|row| row.iter().cloned().map(raw).collect())
                        .collect(),
                ),
                None => VecCursor::default(),
            }
        };
        Ok(Box::new(MockCursor {
            rows,
            state: Arc::clone(&self.state),
        }))
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(MockEvent::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        })?;
        self.check(sql)?;
        Ok(1)
    }

    async fn execute_insert(
        &mut self,
        sql: &str,
        params: &[Value],
        key_columns: &[String],
    ) -> Result<InsertOutcome> {
        self.record(MockEvent::Insert {
            sql: sql.to_string(),
            params: params.to_vec(),
            key_columns: key_columns.to_vec(),
        })?;
        self.check(sql)?;
        let mut state = lock(&self.state);
        let generated_keys = key_columns
            .iter()
            .map(|_| {
                state.next_key += 1;
                Value::Long(state.next_key)
            })
            .collect();
        Ok(InsertOutcome {
            affected: 1,
            generated_keys,
        })
    }

    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<Vec<u64>> {
        self.record(MockEvent::Batch { size: rows.len() })?;
        self.check(sql)?;
        let mut state = lock(&self.state);
        state.batches += 1;
        if state.fail_batch_at == Some(state.batches) {
            return Err(SqlRecordError::ExecutionError(format!(
                "mock batch {} failed",
                state.batches
            )));
        }
        Ok(vec![1; rows.len()])
    }

    async fn execute_script(&mut self, script: &str) -> Result<()> {
        self.record(MockEvent::Script(script.to_string()))?;
        self.check(script)
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.record(MockEvent::SetAutoCommit(auto_commit))?;
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.record(MockEvent::SetIsolation(level))?;
        self.isolation = level;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.record(MockEvent::Commit)?;
        if lock(&self.state).fail_commit {
            return Err(SqlRecordError::ExecutionError("mock commit failed".to_string()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record(MockEvent::Rollback)?;
        if lock(&self.state).fail_rollback {
            return Err(SqlRecordError::ExecutionError("mock rollback failed".to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.record(MockEvent::Close)?;
        self.closed = true;
        if lock(&self.state).fail_close {
            return Err(SqlRecordError::ExecutionError("mock close failed".to_string()));
        }
        Ok(())
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn raw(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(v) => RawValue::Bool(v),
        Value::Int(v) => RawValue::Int(v),
        Value::Long(v) => RawValue::Long(v),
        Value::Float(v) => RawValue::Float(v),
        Value::Decimal(v) => RawValue::Decimal(v),
        Value::Text(v) | Value::Enum(v) => RawValue::Text(v),
        Value::Bytes(v) => RawValue::Bytes(v),
        Value::Date(v) => RawValue::Date(v),
        Value::Time(v) => RawValue::Time(v),
        Value::Timestamp(v) => RawValue::Timestamp(v),
        Value::Json(v) => RawValue::Json(v),
        Value::Array(items) => RawValue::Array(items.into_iter().map(raw).collect()),
    }
}
