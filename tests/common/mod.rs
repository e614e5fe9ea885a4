#![allow(dead_code)]

use std::sync::Arc;

use sql_record::prelude::*;
use tempfile::TempDir;

pub const SCHEMA: &str = "
    create table users(
        id integer primary key autoincrement,
        name text not null,
        age integer,
        active boolean
    );
    create table user_role(
        user_id integer not null,
        role_id integer not null,
        note text,
        primary key(user_id, role_id)
    );
    create table nums(n integer not null);
";

/// A file-backed SQLite database with the test schema. Keep the `TempDir` alive for the
/// duration of the test.
pub async fn sqlite_db(pool_size: u32) -> Result<(TempDir, Db), SqlRecordError> {
    sqlite_db_with(pool_size, |builder| builder).await
}

pub async fn sqlite_db_with(
    pool_size: u32,
    configure: impl FnOnce(ScopeBuilder) -> ScopeBuilder,
) -> Result<(TempDir, Db), SqlRecordError> {
    let dir = tempfile::tempdir().map_err(|e| SqlRecordError::Other(e.to_string()))?;
    let path = dir.path().join("records.db");
    let datasource =
        SqliteDataSource::connect(SqliteOptions::new(path.to_string_lossy()).pool_size(pool_size))
            .await?;
    let builder = ConnectionScope::builder("main")
        .datasource(datasource)
        .dialect_kind(DialectKind::Sqlite);
    let scope: Arc<ConnectionScope> = configure(builder).build()?;
    let db = Db::new(scope);
    db.execute_script(SCHEMA).await?;
    Ok((dir, db))
}

pub async fn insert_numbers(db: &Db, count: i64) -> Result<(), SqlRecordError> {
    let rows: Vec<Vec<Value>> = (1..=count).map(|n| vec![Value::Long(n)]).collect();
    db.batch("insert into nums(n) values(?)", &rows, 10).await?;
    Ok(())
}
