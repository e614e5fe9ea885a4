use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::Object;

use super::params::{PgValue, as_refs};
use super::query::{PgCursor, describe, extract_value};
use crate::connection::{AutoCommitState, BeginAction, Connection, EndAction, InsertOutcome};
use crate::cursor::ResultCursor;
use crate::error::{Result, SqlRecordError};
use crate::record_builder::decode;
use crate::translation::to_numbered;
use crate::types::{IsolationLevel, Value};

/// Connection wrapper around a pooled tokio-postgres client.
///
/// Autocommit is emulated: with it off, `BEGIN ISOLATION LEVEL ...` is sent in front of the
/// next statement. Query rows are streamed: the cursor pulls them from the server as it is
/// read.
pub struct PgConnection {
    client: Option<Object>,
    state: AutoCommitState,
    pending_timeout: Option<Option<Duration>>,
    timeout_set: bool,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self {
            client: Some(client),
            state: AutoCommitState::default(),
            pending_timeout: None,
            timeout_set: false,
        }
    }

    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| SqlRecordError::ConnectionError("postgres connection is closed".to_string()))
    }

    /// Apply a pending statement timeout and open the lazy transaction.
    async fn prepare_session(&mut self) -> Result<()> {
        if let Some(timeout) = self.pending_timeout.take() {
            let millis = timeout.map_or(0, |t| t.as_millis());
            self.client()?
                .batch_execute(&format!("SET statement_timeout = {millis}"))
                .await?;
            self.timeout_set = timeout.is_some();
        }
        let BeginAction::Begin(level) = self.state.before_statement() else {
            return Ok(());
        };
        let begin = format!("BEGIN ISOLATION LEVEL {}", level.as_sql());
        let begun = self.client()?.batch_execute(&begin).await;
        if let Err(e) = begun {
            self.state.rollback();
            return Err(e.into());
        }
        Ok(())
    }

    async fn end(&self, action: EndAction) -> Result<()> {
        let sql = match action {
            EndAction::None => return Ok(()),
            EndAction::Commit => "COMMIT",
            EndAction::Rollback => "ROLLBACK",
        };
        Ok(self.client()?.batch_execute(sql).await?)
    }
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("open", &self.client.is_some())
            .field("state", &self.state)
            .finish()
    }
}

/// Append a `RETURNING` clause for the key columns unless the statement has one.
fn with_returning(sql: &str, key_columns: &[String]) -> String {
    if key_columns.is_empty() || sql.to_lowercase().contains(" returning ") {
        return sql.to_owned();
    }
    format!("{sql} RETURNING {}", key_columns.join(", "))
}

#[async_trait]
impl Connection for PgConnection {
    async fn query<'c>(
        &'c mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Box<dyn ResultCursor + 'c>> {
        self.prepare_session().await?;
        let client = self.client()?;
        let stmt = client.prepare_cached(&to_numbered(sql)).await?;
        let values = PgValue::wrap(params);
        let rows = client.query_raw(&stmt, as_refs(&values)).await?;
        Ok(Box::new(PgCursor::new(stmt.columns(), rows)))
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.prepare_session().await?;
        let client = self.client()?;
        let stmt = client.prepare_cached(&to_numbered(sql)).await?;
        let values = PgValue::wrap(params);
        Ok(client.execute(&stmt, &as_refs(&values)).await?)
    }

    async fn execute_insert(
        &mut self,
        sql: &str,
        params: &[Value],
        key_columns: &[String],
    ) -> Result<InsertOutcome> {
        if key_columns.is_empty() {
            let affected = self.execute(sql, params).await?;
            return Ok(InsertOutcome {
                affected,
                generated_keys: Vec::new(),
            });
        }
        self.prepare_session().await?;
        let client = self.client()?;
        let sql = with_returning(&to_numbered(sql), key_columns);
        let stmt = client.prepare_cached(&sql).await?;
        let values = PgValue::wrap(params);
        let rows = client.query(&stmt, &as_refs(&values)).await?;

        let mut generated_keys = Vec::with_capacity(key_columns.len());
        if let Some(row) = rows.first() {
            for (idx, column) in stmt.columns().iter().enumerate() {
                generated_keys.push(decode(extract_value(row, idx)?, &describe(column))?);
            }
        }
        Ok(InsertOutcome {
            affected: u64::try_from(rows.len()).unwrap_or(u64::MAX),
            generated_keys,
        })
    }

    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<Vec<u64>> {
        self.prepare_session().await?;
        let client = self.client()?;
        let stmt = client.prepare_cached(&to_numbered(sql)).await?;
        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let values = PgValue::wrap(row);
            counts.push(client.execute(&stmt, &as_refs(&values)).await?);
        }
        Ok(counts)
    }

    async fn execute_script(&mut self, script: &str) -> Result<()> {
        self.prepare_session().await?;
        Ok(self.client()?.batch_execute(script).await?)
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

    /// Roll back unfinished work, reset the session timeout and return the client to the pool.
    async fn close(&mut self) -> Result<()> {
        let mut outcome = if self.state.in_transaction() {
            let action = self.state.rollback();
            self.end(action).await
        } else {
            Ok(())
        };
        if self.timeout_set && outcome.is_ok() {
            outcome = match self.client() {
                Ok(client) => client
                    .batch_execute("RESET statement_timeout")
                    .await
                    .map_err(SqlRecordError::from),
                Err(e) => Err(e),
            };
        }
        self.client = None;
        outcome
    }

    fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        if timeout.is_some() || self.timeout_set {
            self.pending_timeout = Some(timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returning_is_appended_once() {
        let keys = vec!["id".to_string()];
        assert_eq!(
            with_returning("insert into t(a) values($1)", &keys),
            "insert into t(a) values($1) RETURNING id"
        );
        assert_eq!(
            with_returning("insert into t(a) values($1) returning id", &keys),
            "insert into t(a) values($1) returning id"
        );
        assert_eq!(with_returning("insert into t(a) values($1)", &[]), "insert into t(a) values($1)");
    }
}
