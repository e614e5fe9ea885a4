use async_trait::async_trait;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Rows, Statement, params_from_iter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::config::SharedSqliteConnection;
use super::connection::join_error;
use crate::cursor::{ColumnInfo, RawValue, ResultCursor};
use crate::error::{Result, SqlRecordError};
use crate::types::SqlType;

/// Rows the blocking reader may fetch ahead of the cursor.
const READ_AHEAD: usize = 16;

type RowSender = mpsc::Sender<Result<Vec<RawValue>>>;

/// Cursor fed by a reader on the blocking pool that steps the live rusqlite statement.
///
/// The reader holds the connection until the result ends or the cursor is dropped, and stays
/// at most [`READ_AHEAD`] rows in front of it.
pub(crate) struct SqliteCursor {
    columns: Vec<ColumnInfo>,
    rows: mpsc::Receiver<Result<Vec<RawValue>>>,
    reader: Option<JoinHandle<()>>,
}

impl SqliteCursor {
    /// Prepare and start `sql` on the blocking pool. Returns once the statement is described.
    pub(crate) async fn open(
        conn: SharedSqliteConnection,
        sql: String,
        params: Vec<SqliteValue>,
    ) -> Result<Self> {
        let (columns_tx, columns_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(READ_AHEAD);
        let reader = tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            read_rows(&guard, &sql, params, columns_tx, &rows_tx);
        });
        let Ok(described) = columns_rx.await else {
            return Err(match reader.await {
                Err(e) => join_error(e),
                Ok(()) => SqlRecordError::ExecutionError(
                    "sqlite reader stopped before describing the statement".to_string(),
                ),
            });
        };
        Ok(Self {
            columns: described?,
            rows: rows_rx,
            reader: Some(reader),
        })
    }
}

#[async_trait]
impl ResultCursor for SqliteCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<RawValue>>> {
        if let Some(row) = self.rows.recv().await {
            return row.map(Some);
        }
        if let Some(reader) = self.reader.take() {
            reader.await.map_err(join_error)?;
        }
        Ok(None)
    }
}

fn read_rows(
    conn: &rusqlite::Connection,
    sql: &str,
    params: Vec<SqliteValue>,
    columns_tx: oneshot::Sender<Result<Vec<ColumnInfo>>>,
    rows_tx: &RowSender,
) {
    let mut stmt = match conn.prepare_cached(sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = columns_tx.send(Err(e.into()));
            return;
        }
    };
    let columns = describe(&stmt);
    let width = columns.len();
    let mut rows = match stmt.query(params_from_iter(params)) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = columns_tx.send(Err(e.into()));
            return;
        }
    };
    if columns_tx.send(Ok(columns)).is_err() {
        return;
    }
    loop {
        match fetch(&mut rows, width) {
            Ok(Some(row)) => {
                // A closed channel means the cursor was dropped.
                if rows_tx.blocking_send(Ok(row)).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                let _ = rows_tx.blocking_send(Err(e));
                return;
            }
        }
    }
}

fn fetch(rows: &mut Rows<'_>, width: usize) -> Result<Option<Vec<RawValue>>> {
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut values = Vec::with_capacity(width);
    for idx in 0..width {
        values.push(raw_value(row.get_ref(idx)?));
    }
    Ok(Some(values))
}

/// Column metadata from the prepared statement's declared types.
pub(crate) fn describe(stmt: &Statement<'_>) -> Vec<ColumnInfo> {
    stmt.columns()
        .iter()
        .map(|c| {
            let declared = c.decl_type().unwrap_or_default();
            ColumnInfo::new(c.name(), column_type(declared), declared)
        })
        .collect()
}

/// `SQLite` integers are always 64-bit, whatever width the column declares.
fn column_type(declared: &str) -> SqlType {
    match SqlType::from_declared(declared) {
        SqlType::SmallInt | SqlType::Integer => SqlType::BigInt,
        other => other,
    }
}

fn raw_value(value: ValueRef<'_>) -> RawValue {
    match value {
        ValueRef::Null => RawValue::Null,
        ValueRef::Integer(i) => RawValue::Long(i),
        ValueRef::Real(f) => RawValue::Float(f),
        ValueRef::Text(t) => RawValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => RawValue::Bytes(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_columns_are_64_bit() {
        assert_eq!(column_type("INTEGER"), SqlType::BigInt);
        assert_eq!(column_type("TIMESTAMP"), SqlType::Timestamp);
        assert_eq!(column_type(""), SqlType::Unknown);
    }
}
