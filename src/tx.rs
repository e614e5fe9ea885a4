//! Atomic units of work over a scope's confined connection.
//!
//! The first transaction on a task acquires a connection, turns autocommit off and binds the
//! connection to the task for the duration of the unit of work. Transactions started inside
//! it on the same task join it: they share the connection, never commit on their own, and
//! force the whole transaction to roll back when they return `false`, even when the caller
//! discards the resulting error.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::error::{Result, SqlRecordError};
use crate::scope::ConnectionScope;
use crate::scope::confined::{self, ConfinedConnection};
use crate::types::IsolationLevel;

pub struct TransactionCoordinator<'a> {
    scope: &'a ConnectionScope,
}

impl<'a> TransactionCoordinator<'a> {
    #[must_use]
    pub fn new(scope: &'a ConnectionScope) -> Self {
        Self { scope }
    }

    /// Run `atom` atomically. It commits when `atom` yields `Ok(true)` and rolls back when it
    /// yields `Ok(false)` or an error; the returned value is the atom's decision.
    ///
    /// Nested inside another transaction on the same scope and task, `Ok(true)` is returned
    /// without committing and `Ok(false)` becomes
    /// [`SqlRecordError::NestedTransactionRollback`], which rolls the enclosing transaction back.
    ///
    /// # Errors
    /// Returns the atom's error, the nested-rollback signal, a commit failure, or errors
    /// raised while acquiring and preparing the connection.
    pub async fn run<F, Fut>(&self, level: IsolationLevel, atom: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        if let Some(conn) = confined::current(self.scope.id()) {
            return join(conn, level, atom).await;
        }

        let mut conn = self.scope.acquire().await?;
        let auto_commit = conn.auto_commit();
        if let Err(e) = begin(conn.as_mut(), level).await {
            restore_and_close(conn.as_mut(), auto_commit).await;
            return Err(e);
        }

        let slot = ConfinedConnection::new(conn);
        let mut cleanup = AbandonedTx::new(slot.clone(), auto_commit);
        let mut outcome = confined::bind(self.scope.id(), slot.clone(), atom()).await;
        cleanup.disarm();
        if slot.is_rollback_only() && outcome.is_ok() {
            outcome = Err(SqlRecordError::NestedTransactionRollback);
        }

        let mut guard = slot.lock().await;
        let conn = guard.as_mut();
        let result = match outcome {
            Ok(true) => match conn.commit().await {
                Ok(()) => Ok(true),
                Err(e) => {
                    tracing::error!(scope = self.scope.name(), error = %e, "Commit failed");
                    rollback_logged(conn).await;
                    Err(e)
                }
            },
            Ok(false) => {
                rollback_logged(conn).await;
                Ok(false)
            }
            Err(e) => {
                rollback_logged(conn).await;
                Err(e)
            }
        };
        restore_and_close(conn, auto_commit).await;
        result
    }
}

/// Run `atom` as an independent transaction on a new task, with its own connection. It
/// commits or rolls back regardless of any transaction the caller is in.
pub fn run_in_new_task<F, Fut>(
    scope: Arc<ConnectionScope>,
    level: IsolationLevel,
    atom: F,
) -> JoinHandle<Result<bool>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    tokio::spawn(async move { TransactionCoordinator::new(&scope).run(level, atom).await })
}

async fn join<F, Fut>(conn: ConfinedConnection, level: IsolationLevel, atom: F) -> Result<bool>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    {
        let mut guard = conn.lock().await;
        if level > guard.isolation_level() {
            guard.set_isolation_level(level).await?;
        }
    }
    match atom().await {
        Ok(true) => Ok(true),
        Ok(false) => {
            conn.mark_rollback_only();
            Err(SqlRecordError::NestedTransactionRollback)
        }
        Err(e) => Err(e),
    }
}

async fn begin(conn: &mut dyn Connection, level: IsolationLevel) -> Result<()> {
    conn.set_auto_commit(false).await?;
    conn.set_isolation_level(level).await
}

async fn rollback_logged(conn: &mut dyn Connection) {
    if let Err(e) = conn.rollback().await {
        tracing::error!(error = %e, "Rollback failed");
    }
}

async fn restore_and_close(conn: &mut dyn Connection, auto_commit: bool) {
    if let Err(e) = conn.set_auto_commit(auto_commit).await {
        tracing::warn!(error = %e, "Failed to restore autocommit");
    }
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "Failed to close transaction connection");
    }
}

/// Rolls back and releases the connection when a transaction's unit of work panics or its
/// future is dropped before finishing.
struct AbandonedTx {
    slot: Option<ConfinedConnection>,
    auto_commit: bool,
}

impl AbandonedTx {
    fn new(slot: ConfinedConnection, auto_commit: bool) -> Self {
        Self {
            slot: Some(slot),
            auto_commit,
        }
    }

    fn disarm(&mut self) {
        self.slot = None;
    }
}

impl Drop for AbandonedTx {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let auto_commit = self.auto_commit;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut guard = slot.lock().await;
                    rollback_logged(guard.as_mut()).await;
                    restore_and_close(guard.as_mut(), auto_commit).await;
                });
            }
            Err(_) => {
                tracing::warn!("Transaction abandoned outside a runtime; connection dropped without rollback");
            }
        }
    }
}
