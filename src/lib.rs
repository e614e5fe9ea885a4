//! Record-oriented SQL access over pluggable dialects and drivers.
//!
//! A [`ConnectionScope`] ties a [`DataSource`] to a [`Dialect`](dialect::Dialect) and the
//! optional collaborators (cache, statistics sink, SQL templates). [`Db`] is the facade most
//! code talks to: it reads rows as [`Record`]s, saves and updates records by primary key,
//! paginates, batches and runs transactions whose connection is shared by everything the
//! transaction calls.
//!
//! Drivers ship behind features: `sqlite` (rusqlite pooled by bb8) and `postgres`
//! (tokio-postgres pooled by deadpool-postgres).

pub mod batch;
pub mod cache;
pub mod connection;
pub mod cursor;
pub mod db;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod meta;
pub mod paginate;
pub mod prelude;
pub mod record;
pub mod record_builder;
pub mod scope;
pub mod sql_para;
pub mod translation;
pub mod tx;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{Cache, CachedValue, MemoryCache};
pub use connection::{Connection, DataSource, InsertOutcome};
pub use db::{Db, DbTemplate};
pub use error::{Result, SqlRecordError};
pub use paginate::Page;
pub use record::{FromRecord, Record};
pub use scope::{ConnectionScope, DbRegistry, ScopeBuilder};
pub use types::{ColumnCase, DialectKind, IsolationLevel, SqlType, Value};
