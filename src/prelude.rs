//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and traits
//! to make it easier to get started with the library.

pub use crate::cache::{Cache, CachedValue, MemoryCache};
pub use crate::connection::{Connection, DataSource, InsertOutcome};
pub use crate::cursor::{ColumnInfo, ResultCursor};
pub use crate::db::{Db, DbTemplate};
pub use crate::dialect::{
    AnsiDialect, Dialect, MysqlDialect, OracleDialect, PostgresDialect, SqlServerDialect,
    SqliteDialect,
};
pub use crate::error::SqlRecordError;
pub use crate::executor::stats::{SqlStat, StatementKind, StatsSink, TracingStatsSink};
pub use crate::meta::TableMeta;
pub use crate::paginate::Page;
pub use crate::record::{FromRecord, Record};
pub use crate::scope::{ConnectionScope, DbRegistry, ScopeBuilder};
pub use crate::sql_para::{SqlPara, SqlTemplates, StaticTemplates};
pub use crate::types::{ColumnCase, DialectKind, IsolationLevel, SqlType, Value};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresDataSource;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDataSource, SqliteOptions};
