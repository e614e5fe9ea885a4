use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bb8::PooledConnection;
use rusqlite::params_from_iter;
use tokio::task::JoinError;

use super::config::{SharedSqliteConnection, SqliteManager};
use super::params::convert;
use super::query::SqliteCursor;
use crate::connection::{AutoCommitState, BeginAction, Connection, EndAction, InsertOutcome};
use crate::cursor::ResultCursor;
use crate::error::{Result, SqlRecordError};
use crate::types::{IsolationLevel, Value};

/// Connection wrapper backed by a bb8 pooled `SQLite` connection.
///
/// Every rusqlite call runs on the blocking pool. Queries keep stepping there, a few rows ahead
/// of their cursor, so a cursor can be read lazily and abandoned early.
pub struct SqliteConnection {
    conn: Option<PooledConnection<'static, SqliteManager>>,
    state: AutoCommitState,
}

impl SqliteConnection {
    pub(crate) fn new(conn: PooledConnection<'static, SqliteManager>) -> Self {
        Self {
            conn: Some(conn),
            state: AutoCommitState::default(),
        }
    }

    fn handle(&self) -> Result<SharedSqliteConnection> {
        self.conn
            .as_ref()
            .map(|c| Arc::clone(&**c))
            .ok_or_else(|| SqlRecordError::ConnectionError("sqlite connection is closed".to_string()))
    }

    async fn run<F, R>(&self, func: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(self.handle()?, func).await
    }

    /// Open the lazy transaction when autocommit is off.
    async fn begin_if_needed(&mut self) -> Result<()> {
        let BeginAction::Begin(level) = self.state.before_statement() else {
            return Ok(());
        };
        let sql = begin_sql(level);
        if let Err(e) = self.run(move |c| Ok(c.execute_batch(&sql)?)).await {
            self.state.rollback();
            return Err(e);
        }
        Ok(())
    }

    async fn end(&mut self, action: EndAction) -> Result<()> {
        let sql = match action {
            EndAction::None => return Ok(()),
            EndAction::Commit => "COMMIT",
            EndAction::Rollback => "ROLLBACK",
        };
        self.run(move |c| Ok(c.execute_batch(sql)?)).await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("open", &self.conn.is_some())
            .field("state", &self.state)
            .finish()
    }
}

pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(join_error)?
}

pub(crate) fn join_error(e: JoinError) -> SqlRecordError {
    SqlRecordError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
}

/// `SQLite` transactions are serializable; read-uncommitted only applies to shared-cache
/// connections and is set per connection.
fn begin_sql(level: IsolationLevel) -> String {
    let uncommitted = u8::from(level == IsolationLevel::ReadUncommitted);
    format!("PRAGMA read_uncommitted = {uncommitted}; BEGIN")
}

fn affected(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn query<'c>(
        &'c mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Box<dyn ResultCursor + 'c>> {
        self.begin_if_needed().await?;
        let cursor = SqliteCursor::open(self.handle()?, sql.to_owned(), convert(params)).await?;
        Ok(Box::new(cursor))
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.begin_if_needed().await?;
        let sql = sql.to_owned();
        let values = convert(params);
        self.run(move |c| {
            let mut stmt = c.prepare_cached(&sql)?;
            Ok(affected(stmt.execute(params_from_iter(values))?))
        })
        .await
    }

    async fn execute_insert(
        &mut self,
        sql: &str,
        params: &[Value],
        key_columns: &[String],
    ) -> Result<InsertOutcome> {
        self.begin_if_needed().await?;
        let sql = sql.to_owned();
        let values = convert(params);
        let want_key = !key_columns.is_empty();
        self.run(move |c| {
            let n = c.prepare_cached(&sql)?.execute(params_from_iter(values))?;
            let generated_keys = if want_key && n > 0 {
                vec![Value::Long(c.last_insert_rowid())]
            } else {
                Vec::new()
            };
            Ok(InsertOutcome {
                affected: affected(n),
                generated_keys,
            })
        })
        .await
    }

    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<Vec<u64>> {
        self.begin_if_needed().await?;
        let sql = sql.to_owned();
        let rows: Vec<_> = rows.iter().map(|r| convert(r)).collect();
        self.run(move |c| {
            let mut stmt = c.prepare_cached(&sql)?;
            let mut counts = Vec::with_capacity(rows.len());
            for row in rows {
                counts.push(affected(stmt.execute(params_from_iter(row))?));
            }
            Ok(counts)
        })
        .await
    }

    async fn execute_script(&mut self, script: &str) -> Result<()> {
        self.begin_if_needed().await?;
        let script = script.to_owned();
        self.run(move |c| Ok(c.execute_batch(&script)?)).await
    }

    fn auto_commit(&self) -> bool {
        self.state.auto_commit()
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        let action = self.state.set_auto_commit(auto_commit);
        self.end(action).await
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.state.isolation()
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.state.set_isolation(level);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let action = self.state.commit();
        self.end(action).await
    }

    async fn rollback(&mut self) -> Result<()> {
        let action = self.state.rollback();
        self.end(action).await
    }

    /// Roll back unfinished work and return the connection to the pool.
    async fn close(&mut self) -> Result<()> {
        let outcome = if self.state.in_transaction() {
            let action = self.state.rollback();
            self.end(action).await
        } else {
            Ok(())
        };
        self.conn = None;
        outcome
    }
}
