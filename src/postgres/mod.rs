//! Postgres driver: tokio-postgres clients pooled by deadpool-postgres.
//!
//! Statements arrive with `?` placeholders and are rewritten to `$n` before preparing.

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::PostgresDataSource;
pub use connection::PgConnection;
pub use params::PgValue;
