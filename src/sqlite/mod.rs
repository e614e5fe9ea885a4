//! `SQLite` driver: rusqlite connections pooled by bb8.
//!
//! - config: options, the bb8 manager and the datasource
//! - connection: the [`crate::Connection`] implementation
//! - params: value binding
//! - query: streaming result cursor

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{SharedSqliteConnection, SqliteDataSource, SqliteManager, SqliteOptions};
pub use connection::SqliteConnection;
