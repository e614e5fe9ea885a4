//! Per-statement execution statistics.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Query,
    Update,
    Insert,
    Batch,
    Script,
    Describe,
}

impl StatementKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Query => "query",
            StatementKind::Update => "update",
            StatementKind::Insert => "insert",
            StatementKind::Batch => "batch",
            StatementKind::Script => "script",
            StatementKind::Describe => "describe",
        }
    }
}

/// One executed statement as reported to a [`StatsSink`].
#[derive(Debug, Clone)]
pub struct SqlStat<'a> {
    /// Name of the connection scope that ran the statement.
    pub name: &'a str,
    pub kind: StatementKind,
    pub sql: &'a str,
    pub params: &'a [Value],
    /// Rows returned for queries, rows affected otherwise.
    pub row_count: u64,
    pub start_time: DateTime<Utc>,
    pub elapsed: Duration,
    /// Always `true`: the caller awaited the statement.
    pub synchronous: bool,
}

impl SqlStat<'_> {
    #[must_use]
    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// Observability hook. Errors and panics raised here are logged and otherwise ignored.
pub trait StatsSink: Send + Sync {
    /// # Errors
    /// Implementations may fail; the statement's outcome is unaffected.
    fn record(&self, stat: &SqlStat<'_>) -> Result<()>;
}

/// Reports statements as `tracing` events at DEBUG level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn record(&self, stat: &SqlStat<'_>) -> Result<()> {
        tracing::debug!(
            scope = stat.name,
            kind = stat.kind.as_str(),
            sql = stat.sql,
            params = ?stat.params,
            row_count = stat.row_count,
            start_time = %stat.start_time,
            elapsed_ms = stat.elapsed_millis(),
            "Statement executed"
        );
        Ok(())
    }
}

/// Deliver `stat` without letting the sink affect the caller.
pub(crate) fn emit(sink: &dyn StatsSink, stat: &SqlStat<'_>) {
    match catch_unwind(AssertUnwindSafe(|| sink.record(stat))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(error = %e, sql = stat.sql, "Statistics sink failed");
        }
        Err(_) => {
            tracing::warn!(sql = stat.sql, "Statistics sink panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlRecordError;

    struct Failing;

    impl StatsSink for Failing {
        fn record(&self, _stat: &SqlStat<'_>) -> Result<()> {
            Err(SqlRecordError::Other("sink down".into()))
        }
    }

    struct Panicking;

    impl StatsSink for Panicking {
        fn record(&self, _stat: &SqlStat<'_>) -> Result<()> {
            panic!("sink bug");
        }
    }

    fn stat() -> SqlStat<'static> {
        SqlStat {
            name: "main",
            kind: StatementKind::Query,
            sql: "select 1",
            params: &[],
            row_count: 1,
            start_time: Utc::now(),
            elapsed: Duration::from_millis(3),
            synchronous: true,
        }
    }

    #[test]
    fn failing_and_panicking_sinks_are_contained() {
        emit(&Failing, &stat());
        emit(&Panicking, &stat());
        emit(&TracingStatsSink, &stat());
    }
}
