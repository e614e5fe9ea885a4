//! Per-database configuration and connection routing.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::cache::Cache;
use crate::connection::{Connection, DataSource};
use crate::dialect::{self, Dialect};
use crate::error::{Result, SqlRecordError};
use crate::executor::stats::StatsSink;
use crate::meta::TableRegistry;
use crate::sql_para::SqlTemplates;
use crate::types::{ColumnCase, DialectKind, IsolationLevel};

pub(crate) mod confined;
mod lease;
mod registry;

pub(crate) use lease::Lease;
pub use registry::DbRegistry;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Whether an operation only reads. Reads outside a transaction may go to a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Read,
    Write,
}

/// Everything needed to talk to one logical database: where connections come from, which
/// dialect generates SQL, and the collaborators that observe or cache operations.
///
/// Scopes are built once at startup and shared behind an `Arc`.
pub struct ConnectionScope {
    id: u64,
    name: String,
    datasource: Arc<dyn DataSource>,
    replicas: Vec<Arc<dyn DataSource>>,
    next_replica: AtomicUsize,
    dialect: Arc<dyn Dialect>,
    isolation: IsolationLevel,
    show_sql: bool,
    column_case: ColumnCase,
    query_timeout: Option<Duration>,
    cache: Option<Arc<dyn Cache>>,
    stats: Option<Arc<dyn StatsSink>>,
    templates: Option<Arc<dyn SqlTemplates>>,
    tables: TableRegistry,
}

impl fmt::Debug for ConnectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionScope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dialect", &self.dialect.name())
            .field("replicas", &self.replicas.len())
            .field("isolation", &self.isolation)
            .field("show_sql", &self.show_sql)
            .field("column_case", &self.column_case)
            .field("query_timeout", &self.query_timeout)
            .field("cache", &self.cache.is_some())
            .field("stats", &self.stats.is_some())
            .finish_non_exhaustive()
    }
}

impl ConnectionScope {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ScopeBuilder {
        ScopeBuilder::new(name)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    #[must_use]
    pub fn show_sql(&self) -> bool {
        self.show_sql
    }

    #[must_use]
    pub fn column_case(&self) -> ColumnCase {
        self.column_case
    }

    #[must_use]
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    #[must_use]
    pub fn cache(&self) -> Option<&dyn Cache> {
        self.cache.as_deref()
    }

    #[must_use]
    pub fn stats(&self) -> Option<&dyn StatsSink> {
        self.stats.as_deref()
    }

    #[must_use]
    pub fn templates(&self) -> Option<&dyn SqlTemplates> {
        self.templates.as_deref()
    }

    #[must_use]
    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    /// True when the current task is inside a transaction on this scope.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        confined::current(self.id).is_some()
    }

    /// Acquire a fresh connection from the primary datasource.
    pub(crate) async fn acquire(&self) -> Result<Box<dyn Connection>> {
        let mut conn = self.datasource.acquire().await?;
        conn.set_query_timeout(self.query_timeout);
        Ok(conn)
    }

    /// Connection for one operation: the transaction's confined connection when there is
    /// one, otherwise a new connection (from a replica for reads, when replicas exist).
    pub(crate) async fn lease(&self, route: Route) -> Result<Lease> {
        if let Some(conn) = confined::current(self.id) {
            return Ok(Lease::Confined(conn.lock_owned().await));
        }
        let source = match (route, self.select_replica()) {
            (Route::Read, Some(replica)) => replica,
            _ => &self.datasource,
        };
        let mut conn = source.acquire().await?;
        conn.set_query_timeout(self.query_timeout);
        Ok(Lease::Owned(conn))
    }

    fn select_replica(&self) -> Option<&Arc<dyn DataSource>> {
        if self.replicas.is_empty() {
            return None;
        }
        let idx = self.next_replica.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        self.replicas.get(idx)
    }
}

/// Fluent builder for [`ConnectionScope`].
///
/// ```rust
/// use std::sync::Arc;
/// use sql_record::prelude::*;
/// use sql_record::test_utils::MockDataSource;
///
/// let scope = ConnectionScope::builder("main")
///     .datasource(MockDataSource::new())
///     .dialect_kind(DialectKind::Postgres)
///     .isolation(IsolationLevel::RepeatableRead)
///     .show_sql(true)
///     .build()
///     .unwrap();
/// assert_eq!(scope.dialect().name(), "postgres");
/// ```
pub struct ScopeBuilder {
    name: String,
    datasource: Option<Arc<dyn DataSource>>,
    replicas: Vec<Arc<dyn DataSource>>,
    dialect: Option<Arc<dyn Dialect>>,
    isolation: IsolationLevel,
    show_sql: bool,
    column_case: ColumnCase,
    query_timeout: Option<Duration>,
    cache: Option<Arc<dyn Cache>>,
    stats: Option<Arc<dyn StatsSink>>,
    templates: Option<Arc<dyn SqlTemplates>>,
}

impl ScopeBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datasource: None,
            replicas: Vec::new(),
            dialect: None,
            isolation: IsolationLevel::default(),
            show_sql: false,
            column_case: ColumnCase::default(),
            query_timeout: None,
            cache: None,
            stats: None,
            templates: None,
        }
    }

    #[must_use]
    pub fn datasource(self, datasource: impl DataSource + 'static) -> Self {
        self.datasource_arc(Arc::new(datasource))
    }

    #[must_use]
    pub fn datasource_arc(mut self, datasource: Arc<dyn DataSource>) -> Self {
        self.datasource = Some(datasource);
        self
    }

    /// Add a read replica. Reads outside transactions rotate across replicas.
    #[must_use]
    pub fn replica(mut self, replica: Arc<dyn DataSource>) -> Self {
        self.replicas.push(replica);
        self
    }

    #[must_use]
    pub fn dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialect = Some(Arc::new(dialect));
        self
    }

    #[must_use]
    pub fn dialect_kind(mut self, kind: DialectKind) -> Self {
        self.dialect = Some(dialect::for_kind(kind));
        self
    }

    #[must_use]
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    #[must_use]
    pub fn show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    #[must_use]
    pub fn column_case(mut self, column_case: ColumnCase) -> Self {
        self.column_case = column_case;
        self
    }

    #[must_use]
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn stats(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats = Some(sink);
        self
    }

    #[must_use]
    pub fn templates(mut self, templates: Arc<dyn SqlTemplates>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the name, datasource or dialect is missing.
    pub fn build(self) -> Result<Arc<ConnectionScope>> {
        if self.name.trim().is_empty() {
            return Err(SqlRecordError::ConfigError(
                "scope name is required".to_string(),
            ));
        }
        let datasource = self.datasource.ok_or_else(|| {
            SqlRecordError::ConfigError(format!("scope {}: datasource is required", self.name))
        })?;
        let dialect = self.dialect.ok_or_else(|| {
            SqlRecordError::ConfigError(format!("scope {}: dialect is required", self.name))
        })?;

        Ok(Arc::new(ConnectionScope {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            datasource,
            replicas: self.replicas,
            next_replica: AtomicUsize::new(0),
            dialect,
            isolation: self.isolation,
            show_sql: self.show_sql,
            column_case: self.column_case,
            query_timeout: self.query_timeout,
            cache: self.cache,
            stats: self.stats,
            templates: self.templates,
            tables: TableRegistry::default(),
        }))
    }
}
