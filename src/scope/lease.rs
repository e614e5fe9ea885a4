use tokio::sync::OwnedMutexGuard;

use crate::connection::Connection;
use crate::error::{Result, SqlRecordError};

/// A connection held for the duration of one operation.
///
/// Inside a transaction the lease borrows the task-confined connection and releasing it only
/// unlocks it. Outside, the lease owns a freshly acquired connection and releasing it closes it.
pub(crate) enum Lease {
    Confined(OwnedMutexGuard<Box<dyn Connection>>),
    Owned(Box<dyn Connection>),
}

impl Lease {
    pub(crate) fn conn(&mut self) -> &mut dyn Connection {
        match self {
            Lease::Confined(guard) => guard.as_mut(),
            Lease::Owned(conn) => conn.as_mut(),
        }
    }

    pub(crate) fn is_confined(&self) -> bool {
        matches!(self, Lease::Confined(_))
    }

    /// Give the connection back.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConnectionError` when closing an owned connection fails.
    pub(crate) async fn release(self) -> Result<()> {
        match self {
            Lease::Confined(_) => Ok(()),
            Lease::Owned(mut conn) => conn.close().await.map_err(|e| {
                SqlRecordError::ConnectionError(format!("failed to release connection: {e}"))
            }),
        }
    }

    /// Release after `outcome` was produced with this lease. A release failure is returned
    /// only when the operation itself succeeded; otherwise it is logged.
    pub(crate) async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        let released = self.release().await;
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                tracing::warn!(error = %release_err, "Connection release failed after an error");
                Err(e)
            }
        }
    }
}
