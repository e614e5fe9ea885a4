//! Task-confined transaction connections.
//!
//! Each tokio task that runs a transaction carries a map from scope id to the connection
//! bound for that scope. The map is installed with [`tokio::task_local!`] scoping, so it is
//! visible to everything awaited inside the transaction and to nothing else. A spawned task
//! starts without one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::connection::Connection;

/// A transaction's connection plus its rollback-only mark. Clones share both.
#[derive(Clone)]
pub(crate) struct ConfinedConnection {
    conn: Arc<Mutex<Box<dyn Connection>>>,
    rollback_only: Arc<AtomicBool>,
}

impl ConfinedConnection {
    pub(crate) fn new(conn: Box<dyn Connection>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            rollback_only: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Box<dyn Connection>> {
        self.conn.lock().await
    }

    pub(crate) async fn lock_owned(&self) -> OwnedMutexGuard<Box<dyn Connection>> {
        Arc::clone(&self.conn).lock_owned().await
    }

    /// Doom the transaction: the owner rolls back whatever its unit of work returns.
    pub(crate) fn mark_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::Release);
    }

    pub(crate) fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::Acquire)
    }
}

tokio::task_local! {
    static CONFINED: HashMap<u64, ConfinedConnection>;
}

/// Connection bound to `scope_id` on the current task, if a transaction is active.
pub(crate) fn current(scope_id: u64) -> Option<ConfinedConnection> {
    CONFINED
        .try_with(|slots| slots.get(&scope_id).cloned())
        .ok()
        .flatten()
}

/// Run `fut` with `conn` bound to `scope_id`. Bindings for other scopes stay visible.
pub(crate) async fn bind<F: Future>(scope_id: u64, conn: ConfinedConnection, fut: F) -> F::Output {
    let mut slots = CONFINED.try_with(Clone::clone).unwrap_or_default();
    slots.insert(scope_id, conn);
    CONFINED.scope(slots, fut).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockDataSource;
    use crate::connection::DataSource;

    #[tokio::test]
    async fn bound_only_inside_the_scope_and_task() {
        let ds = MockDataSource::new();
        let conn = ConfinedConnection::new(ds.acquire().await.unwrap());
        assert!(current(1).is_none());

        bind(1, conn, async {
            assert!(current(1).is_some());
            assert!(current(2).is_none());
            let spawned = tokio::spawn(async { current(1).is_none() });
            assert!(spawned.await.unwrap());
        })
        .await;

        assert!(current(1).is_none());
    }

    #[tokio::test]
    async fn nested_bindings_keep_outer_scopes() {
        let ds = MockDataSource::new();
        let a = ConfinedConnection::new(ds.acquire().await.unwrap());
        let b = ConfinedConnection::new(ds.acquire().await.unwrap());
        bind(1, a, async {
            bind(2, b, async {
                assert!(current(1).is_some());
                assert!(current(2).is_some());
            })
            .await;
            assert!(current(2).is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn rollback_only_mark_is_shared_by_clones() {
        let ds = MockDataSource::new();
        let conn = ConfinedConnection::new(ds.acquire().await.unwrap());
        let seen = conn.clone();
        bind(1, conn, async {
            if let Some(current) = current(1) {
                current.mark_rollback_only();
            }
        })
        .await;
        assert!(seen.is_rollback_only());
    }
}
