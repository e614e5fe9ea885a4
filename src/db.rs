//! The record-oriented facade over one [`ConnectionScope`].
//!
//! ```rust
//! use sql_record::prelude::*;
//! use sql_record::test_utils::MockDataSource;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let scope = ConnectionScope::builder("main")
//!     .datasource(MockDataSource::new())
//!     .dialect_kind(DialectKind::Postgres)
//!     .build()?;
//! let db = Db::new(scope);
//!
//! let mut user = Record::new();
//! user.set("name", "alice");
//! db.save("users", &mut user).await?;
//! assert!(user.get_long("id").is_some());
//! assert!(user.modified_keys().is_empty());
//! # Ok::<(), SqlRecordError>(())
//! # }).unwrap();
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::batch::BatchExecutor;
use crate::cache::CachingDecorator;
use crate::connection::{BoxFuture, Connection};
use crate::dialect::common::{check_key_count, parse_primary_key, primary_key_values, strip_order_by};
use crate::error::{Result, SqlRecordError};
use crate::executor::QueryExecutor;
use crate::meta::{TableBuilder, TableMeta};
use crate::paginate::{Page, PaginationEngine};
use crate::record::{FromRecord, Record};
use crate::scope::{ConnectionScope, Route};
use crate::sql_para::SqlPara;
use crate::tx::{self, TransactionCoordinator};
use crate::types::{IsolationLevel, Value};

#[derive(Debug, Clone)]
pub struct Db {
    scope: Arc<ConnectionScope>,
    cache_ttl: Option<Duration>,
}

impl Db {
    #[must_use]
    pub fn new(scope: Arc<ConnectionScope>) -> Self {
        Self {
            scope,
            cache_ttl: None,
        }
    }

    /// A handle whose cached reads expire after `ttl`.
    #[must_use]
    pub fn with_cache_ttl(&self, ttl: Duration) -> Self {
        Self {
            scope: Arc::clone(&self.scope),
            cache_ttl: Some(ttl),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &Arc<ConnectionScope> {
        &self.scope
    }

    fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(&self.scope)
    }

    /// Reflect `table` and register its metadata on the scope.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for a bad key spec, or the reflection query's error.
    pub async fn register_table(&self, table: &str, primary_key: Option<&str>) -> Result<Arc<TableMeta>> {
        TableBuilder::new(&self.scope).build(table, primary_key).await
    }

    /// Key columns of `table`: the explicit spec, else the registered key, else the
    /// dialect's default.
    fn table_key(&self, table: &str, primary_key: Option<&str>) -> Result<Vec<String>> {
        if let Some(spec) = primary_key {
            return parse_primary_key(spec);
        }
        Ok(match self.scope.tables().get(table) {
            Some(meta) => meta.primary_key().to_vec(),
            None => vec![self.scope.dialect().default_primary_key().to_string()],
        })
    }

    // ---- reads ----

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn find(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        self.executor().query(sql, params).await
    }

    /// First row of `sql`. The rest of the result is not read.
    ///
    /// # Errors
    /// Returns statement or connection errors.
    pub async fn find_first(&self, sql: &str, params: &[Value]) -> Result<Option<Record>> {
        let mut first = None;
        self.executor()
            .each(sql, params, |record| {
                first = Some(record);
                false
            })
            .await?;
        Ok(first)
    }

    /// # Errors
    /// Returns statement errors or the first conversion error.
    pub async fn find_as<T: FromRecord>(&self, sql: &str, params: &[Value]) -> Result<Vec<T>> {
        self.find(sql, params)
            .await?
            .iter()
            .map(T::from_record)
            .collect()
    }

    /// # Errors
    /// Returns statement errors or the conversion error.
    pub async fn find_first_as<T: FromRecord>(&self, sql: &str, params: &[Value]) -> Result<Option<T>> {
        self.find_first(sql, params)
            .await?
            .as_ref()
            .map(T::from_record)
            .transpose()
    }

    /// Row of `table` whose single-column key equals `id`.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the table's key is composite.
    pub async fn find_by_id(&self, table: &str, id: impl Into<Value>) -> Result<Option<Record>> {
        self.find_by_ids(table, None, &[id.into()]).await
    }

    /// Row of `table` by a possibly composite key; `ids` follow the key column order.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when `ids` does not match the key width.
    pub async fn find_by_ids(
        &self,
        table: &str,
        primary_key: Option<&str>,
        ids: &[Value],
    ) -> Result<Option<Record>> {
        let key = self.table_key(table, primary_key)?;
        check_key_count(&key, ids)?;
        let sql = self.scope.dialect().for_db_find_by_id(table, &key, "*");
        self.find_first(&sql, ids).await
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the table's key is composite.
    pub async fn exists_by_id(&self, table: &str, id: impl Into<Value>) -> Result<bool> {
        let key = self.table_key(table, None)?;
        let ids = [id.into()];
        check_key_count(&key, &ids)?;
        let sql = self.scope.dialect().for_db_exists_by_id(table, &key);
        Ok(self.query_long(&sql, &ids).await?.unwrap_or(0) > 0)
    }

    /// Stream rows to `visit` until it returns `false`.
    ///
    /// # Errors
    /// Returns statement or connection errors.
    pub async fn each<F>(&self, sql: &str, params: &[Value], visit: F) -> Result<usize>
    where
        F: FnMut(Record) -> bool + Send,
    {
        self.executor().each(sql, params, visit).await
    }

    /// First column of the first row.
    ///
    /// # Errors
    /// Returns statement or connection errors.
    pub async fn query_first(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self
            .find_first(sql, params)
            .await?
            .and_then(|r| r.column_values().first().cloned()))
    }

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn query_int(&self, sql: &str, params: &[Value]) -> Result<Option<i32>> {
        Ok(self.query_first(sql, params).await?.and_then(|v| v.as_i32()))
    }

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn query_long(&self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        Ok(self.query_first(sql, params).await?.and_then(|v| v.as_i64()))
    }

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn query_str(&self, sql: &str, params: &[Value]) -> Result<Option<String>> {
        Ok(self
            .query_first(sql, params)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// First column of every row.
    ///
    /// # Errors
    /// Returns statement or connection errors.
    pub async fn query_column(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        Ok(self
            .find(sql, params)
            .await?
            .into_iter()
            .filter_map(|r| r.column_values().first().cloned())
            .collect())
    }

    // ---- writes ----

    /// Insert `record` into `table` and copy generated keys back into it. Afterwards the
    /// record has no modified columns.
    ///
    /// # Errors
    /// Returns statement or connection errors.
    pub async fn save(&self, table: &str, record: &mut Record) -> Result<bool> {
        self.save_with(table, None, record).await
    }

    /// [`Db::save`] with an explicit primary-key spec such as `"user_id, role_id"`.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for a malformed key spec, and statement errors.
    pub async fn save_with(&self, table: &str, primary_key: Option<&str>, record: &mut Record) -> Result<bool> {
        let key = self.table_key(table, primary_key)?;
        let dialect = self.scope.dialect();
        let key_columns = dialect.generated_key_columns(&key, record);
        let para = dialect.for_db_save(table, &key, record);
        let outcome = self
            .executor()
            .insert(para.sql(), para.params(), &key_columns)
            .await?;

        let meta = self.scope.tables().get(table);
        for (column, value) in key_columns.iter().zip(outcome.generated_keys) {
            let column_type = meta.as_ref().and_then(|m| m.column_type(column));
            record.put_unmodified(column, dialect.coerce_generated_key(value, column_type));
        }
        record.clear_modified();
        Ok(outcome.affected >= 1)
    }

    /// Update the modified non-key columns of `record`. Returns `false` without touching the
    /// database when nothing was modified.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the record lacks its key, and statement
    /// errors.
    pub async fn update(&self, table: &str, record: &mut Record) -> Result<bool> {
        self.update_with(table, None, record).await
    }

    /// [`Db::update`] with an explicit primary-key spec.
    ///
    /// # Errors
    /// Same as [`Db::update`].
    pub async fn update_with(&self, table: &str, primary_key: Option<&str>, record: &mut Record) -> Result<bool> {
        let key = self.table_key(table, primary_key)?;
        let Some(para) = self.scope.dialect().for_db_update(table, &key, record)? else {
            return Ok(false);
        };
        let affected = self.executor().update(para.sql(), para.params()).await?;
        record.clear_modified();
        Ok(affected >= 1)
    }

    /// Delete the row `record` was loaded from.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the record lacks its key.
    pub async fn delete(&self, table: &str, record: &Record) -> Result<bool> {
        let key = self.table_key(table, None)?;
        let ids = primary_key_values(&key, record)?;
        self.delete_key(table, &key, &ids).await
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the table's key is composite.
    pub async fn delete_by_id(&self, table: &str, id: impl Into<Value>) -> Result<bool> {
        self.delete_by_ids(table, None, &[id.into()]).await
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when `ids` does not match the key width.
    pub async fn delete_by_ids(&self, table: &str, primary_key: Option<&str>, ids: &[Value]) -> Result<bool> {
        let key = self.table_key(table, primary_key)?;
        self.delete_key(table, &key, ids).await
    }

    async fn delete_key(&self, table: &str, key: &[String], ids: &[Value]) -> Result<bool> {
        check_key_count(key, ids)?;
        let sql = self.scope.dialect().for_db_delete_by_id(table, key);
        Ok(self.executor().update(&sql, ids).await? >= 1)
    }

    /// Run raw DML and return the affected row count.
    ///
    /// # Errors
    /// Returns statement or connection errors.
    pub async fn update_sql(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.executor().update(sql, params).await
    }

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn delete_sql(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.executor().update(sql, params).await
    }

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn execute_script(&self, script: &str) -> Result<()> {
        self.executor().script(script).await
    }

    // ---- paging ----

    /// Page of `select <sql_except_select>`. The count query is derived from
    /// `sql_except_select` with its ORDER BY removed.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for zero page arguments, and statement errors.
    pub async fn paginate(
        &self,
        page_number: u64,
        page_size: u64,
        select: &str,
        sql_except_select: &str,
        params: &[Value],
    ) -> Result<Page<Record>> {
        self.paginate_grouped(page_number, page_size, None, select, sql_except_select, params)
            .await
    }

    /// [`Db::paginate`] for queries whose grouping is known up front.
    ///
    /// # Errors
    /// Same as [`Db::paginate`].
    pub async fn paginate_with_group_by(
        &self,
        page_number: u64,
        page_size: u64,
        is_group_by: bool,
        select: &str,
        sql_except_select: &str,
        params: &[Value],
    ) -> Result<Page<Record>> {
        self.paginate_grouped(page_number, page_size, Some(is_group_by), select, sql_except_select, params)
            .await
    }

    async fn paginate_grouped(
        &self,
        page_number: u64,
        page_size: u64,
        group_by: Option<bool>,
        select: &str,
        sql_except_select: &str,
        params: &[Value],
    ) -> Result<Page<Record>> {
        let total_sql = self.scope.dialect().for_total_row(sql_except_select);
        let find_sql = format!("{} {}", select.trim(), sql_except_select.trim());
        PaginationEngine::new(&self.scope)
            .paginate(page_number, page_size, group_by, &total_sql, &find_sql, params)
            .await
    }

    /// Page of `find_sql` counted by the caller's own `total_row_sql`.
    ///
    /// # Errors
    /// Same as [`Db::paginate`].
    pub async fn paginate_by_full_sql(
        &self,
        page_number: u64,
        page_size: u64,
        total_row_sql: &str,
        find_sql: &str,
        params: &[Value],
    ) -> Result<Page<Record>> {
        PaginationEngine::new(&self.scope)
            .paginate(page_number, page_size, None, total_row_sql, find_sql, params)
            .await
    }

    // ---- cached reads ----

    fn caching(&self) -> Result<CachingDecorator<'_>> {
        self.scope.cache().map(CachingDecorator::new).ok_or_else(|| {
            SqlRecordError::ConfigError(format!("scope {} has no cache configured", self.scope.name()))
        })
    }

    /// [`Db::find`] served from the scope's cache under (`cache_name`, `key`).
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the scope has no cache.
    pub async fn find_by_cache(
        &self,
        cache_name: &str,
        key: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Record>> {
        self.caching()?
            .get_or_load(cache_name, key, self.cache_ttl, || self.find(sql, params))
            .await
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the scope has no cache.
    pub async fn find_first_by_cache(
        &self,
        cache_name: &str,
        key: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Record>> {
        self.caching()?
            .get_or_load(cache_name, key, self.cache_ttl, || self.find_first(sql, params))
            .await
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the scope has no cache.
    #[allow(clippy::too_many_arguments)]
    pub async fn paginate_by_cache(
        &self,
        cache_name: &str,
        key: &str,
        page_number: u64,
        page_size: u64,
        select: &str,
        sql_except_select: &str,
        params: &[Value],
    ) -> Result<Page<Record>> {
        self.caching()?
            .get_or_load(cache_name, key, self.cache_ttl, || {
                self.paginate(page_number, page_size, select, sql_except_select, params)
            })
            .await
    }

    // ---- batches ----

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for a zero batch size, and statement errors.
    pub async fn batch(&self, sql: &str, rows: &[Vec<Value>], batch_size: usize) -> Result<Vec<u64>> {
        BatchExecutor::new(&self.scope).batch(sql, rows, batch_size).await
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for a zero batch size, and statement errors.
    pub async fn batch_sql_list(&self, statements: &[String], batch_size: usize) -> Result<Vec<u64>> {
        BatchExecutor::new(&self.scope)
            .batch_statements(statements, batch_size)
            .await
    }

    /// Insert `records` with the column set of the first one.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ParameterError` when a record lacks one of those columns.
    pub async fn batch_save(&self, table: &str, records: &[Record], batch_size: usize) -> Result<Vec<u64>> {
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        let key = self.table_key(table, None)?;
        let plan = self.scope.dialect().for_batch_save(table, &key, first);
        BatchExecutor::new(&self.scope)
            .batch_records(&plan, records, batch_size)
            .await
    }

    /// Update `records` by key, setting the first record's modified columns (every non-key
    /// column when it has none).
    ///
    /// # Errors
    /// Returns `SqlRecordError::ParameterError` when a record lacks one of those columns.
    pub async fn batch_update(&self, table: &str, records: &[Record], batch_size: usize) -> Result<Vec<u64>> {
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        let key = self.table_key(table, None)?;
        let plan = self.scope.dialect().for_batch_update(table, &key, first);
        BatchExecutor::new(&self.scope)
            .batch_records(&plan, records, batch_size)
            .await
    }

    // ---- transactions ----

    /// Run `atom` in a transaction at the scope's default isolation level.
    ///
    /// # Errors
    /// See [`TransactionCoordinator::run`].
    pub async fn tx<F, Fut>(&self, atom: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        self.tx_with_level(self.scope.isolation(), atom).await
    }

    /// # Errors
    /// See [`TransactionCoordinator::run`].
    pub async fn tx_with_level<F, Fut>(&self, level: IsolationLevel, atom: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        TransactionCoordinator::new(&self.scope).run(level, atom).await
    }

    /// Run `atom` as an independent transaction on its own task and connection.
    pub fn tx_in_new_task<F, Fut>(&self, atom: F) -> JoinHandle<Result<bool>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        tx::run_in_new_task(Arc::clone(&self.scope), self.scope.isolation(), atom)
    }

    // ---- escape hatches ----

    /// Resolve a named SQL template with the scope's template collaborator.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the scope has no templates or the key is
    /// unknown.
    pub fn template(&self, key: &str, args: &HashMap<String, Value>) -> Result<DbTemplate<'_>> {
        let templates = self.scope.templates().ok_or_else(|| {
            SqlRecordError::ConfigError(format!("scope {} has no sql templates configured", self.scope.name()))
        })?;
        Ok(DbTemplate {
            db: self,
            para: templates.resolve(key, args)?,
        })
    }

    /// Hand the operation's connection to `f`: the transaction's connection inside one,
    /// otherwise a fresh connection released afterwards.
    ///
    /// ```rust
    /// use sql_record::prelude::*;
    /// use sql_record::test_utils::MockDataSource;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let scope = ConnectionScope::builder("main")
    ///     .datasource(MockDataSource::new())
    ///     .dialect_kind(DialectKind::Sqlite)
    ///     .build()?;
    /// let n = Db::new(scope)
    ///     .with_connection(|conn| Box::pin(async move { conn.execute("vacuum", &[]).await }))
    ///     .await?;
    /// assert_eq!(n, 1);
    /// # Ok::<(), SqlRecordError>(())
    /// # }).unwrap();
    /// ```
    ///
    /// # Errors
    /// Returns the callback's error or connection errors.
    pub async fn with_connection<R, F>(&self, f: F) -> Result<R>
    where
        F: for<'c> FnOnce(&'c mut dyn Connection) -> BoxFuture<'c, Result<R>>,
    {
        let mut lease = self.scope.lease(Route::Write).await?;
        let outcome = f(lease.conn()).await;
        lease.finish(outcome).await
    }
}

/// A resolved named query bound to its [`Db`].
#[derive(Debug)]
pub struct DbTemplate<'a> {
    db: &'a Db,
    para: SqlPara,
}

impl DbTemplate<'_> {
    #[must_use]
    pub fn para(&self) -> &SqlPara {
        &self.para
    }

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn find(&self) -> Result<Vec<Record>> {
        self.db.find(self.para.sql(), self.para.params()).await
    }

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn find_first(&self) -> Result<Option<Record>> {
        self.db.find_first(self.para.sql(), self.para.params()).await
    }

    /// # Errors
    /// Returns statement or connection errors.
    pub async fn update(&self) -> Result<u64> {
        self.db.update_sql(self.para.sql(), self.para.params()).await
    }

    /// Page of the template's query, counted by wrapping it in a count subquery.
    ///
    /// # Errors
    /// Same as [`Db::paginate`].
    pub async fn paginate(&self, page_number: u64, page_size: u64) -> Result<Page<Record>> {
        let total_sql = format!(
            "select count(*) from ({}) count_alias",
            strip_order_by(self.para.sql())
        );
        self.db
            .paginate_by_full_sql(page_number, page_size, &total_sql, self.para.sql(), self.para.params())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::sql_para::StaticTemplates;
    use crate::test_utils::{MockDataSource, MockEvent};
    use crate::types::{DialectKind, SqlType};

    fn db(ds: &MockDataSource, kind: DialectKind) -> Db {
        let scope = ConnectionScope::builder("main")
            .datasource(ds.clone())
            .dialect_kind(kind)
            .cache(Arc::new(MemoryCache::new()))
            .templates(Arc::new(
                StaticTemplates::new().with("user.byName", "select * from users where name = ?", &["name"]),
            ))
            .build()
            .unwrap();
        Db::new(scope)
    }

    fn inserts(ds: &MockDataSource) -> Vec<(String, Vec<String>)> {
        ds.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Insert { sql, key_columns, .. } => Some((sql, key_columns)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn save_reads_back_unset_keys_at_column_width() {
        let ds = MockDataSource::new();
        let db = db(&ds, DialectKind::Postgres);
        db.scope().tables().insert(
            TableMeta::new(
                "users",
                vec!["id".into()],
                vec![("id".into(), SqlType::Integer), ("name".into(), SqlType::Varchar)],
            )
            .unwrap(),
        );
        let mut user = Record::new();
        user.set("name", "alice");
        assert!(db.save("users", &mut user).await.unwrap());
        assert_eq!(user.get("id"), Some(&Value::Int(1)));
        assert!(user.modified_keys().is_empty());
        assert_eq!(
            inserts(&ds),
            vec![(r#"insert into "users"("name") values(?)"#.to_string(), vec!["id".to_string()])]
        );
    }

    #[tokio::test]
    async fn save_with_key_set_requests_no_generated_keys() {
        let ds = MockDataSource::new();
        let db = db(&ds, DialectKind::Mysql);
        let mut user = Record::new();
        user.set("id", 42).set("name", "bob");
        db.save("users", &mut user).await.unwrap();
        assert_eq!(inserts(&ds)[0].1, Vec::<String>::new());
        assert_eq!(user.get_int("id"), Some(42));
    }

    #[tokio::test]
    async fn update_without_changes_is_a_no_op() {
        let ds = MockDataSource::new();
        let db = db(&ds, DialectKind::Postgres);
        let mut user =
            Record::from_columns(vec!["id".into(), "name".into()], vec![Value::Long(1), Value::from("a")])
                .unwrap();
        assert!(!db.update("users", &mut user).await.unwrap());
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Acquire)), 0);

        user.set("name", "b");
        assert!(db.update("users", &mut user).await.unwrap());
        assert!(user.modified_keys().is_empty());
    }

    #[tokio::test]
    async fn composite_keys_follow_key_order_and_count() {
        let ds = MockDataSource::new();
        let db = db(&ds, DialectKind::Postgres);
        let err = db
            .find_by_ids("user_role", Some("user_id, role_id"), &[Value::Long(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SqlRecordError::ConfigError(_)));

        db.delete_by_ids("user_role", Some("user_id, role_id"), &[Value::Long(1), Value::Long(2)])
            .await
            .unwrap();
        let deleted = ds.events().into_iter().find_map(|e| match e {
            MockEvent::Execute { sql, params } => Some((sql, params)),
            _ => None,
        });
        assert_eq!(
            deleted,
            Some((
                r#"delete from "user_role" where "user_id" = ? and "role_id" = ?"#.to_string(),
                vec![Value::Long(1), Value::Long(2)]
            ))
        );
    }

    #[tokio::test]
    async fn scalar_helpers_read_the_first_column() {
        let ds = MockDataSource::new();
        ds.respond("count(*)", vec!["c"], vec![vec![Value::Long(3)]]);
        ds.respond("select name", vec!["name"], vec![vec![Value::from("a")], vec![Value::from("b")]]);
        let db = db(&ds, DialectKind::Sqlite);
        assert_eq!(db.query_long("select count(*) from users", &[]).await.unwrap(), Some(3));
        assert_eq!(db.query_int("select count(*) from users", &[]).await.unwrap(), Some(3));
        assert_eq!(db.query_str("select name from users", &[]).await.unwrap().as_deref(), Some("a"));
        assert_eq!(
            db.query_column("select name from users", &[]).await.unwrap(),
            vec![Value::from("a"), Value::from("b")]
        );
        assert!(db.exists_by_id("users", 1).await.unwrap());
    }

    #[tokio::test]
    async fn cached_find_hits_the_database_once() {
        let ds = MockDataSource::new();
        ds.respond("from users", vec!["id"], vec![vec![Value::Long(1)]]);
        let db = db(&ds, DialectKind::Postgres);
        for _ in 0..2 {
            let rows = db.find_by_cache("users", "all", "select * from users", &[]).await.unwrap();
            assert_eq!(rows.len(), 1);
        }
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Query { .. })), 1);
    }

    #[tokio::test]
    async fn cached_find_reloads_once_the_handle_ttl_lapses() {
        let ds = MockDataSource::new();
        ds.respond("from users", vec!["id"], vec![vec![Value::Long(1)]]);
        let db = db(&ds, DialectKind::Postgres).with_cache_ttl(Duration::ZERO);
        for _ in 0..2 {
            let rows = db.find_by_cache("users", "all", "select * from users", &[]).await.unwrap();
            assert_eq!(rows.len(), 1);
        }
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Query { .. })), 2);
    }

    #[tokio::test]
    async fn cached_reads_need_a_cache() {
        let ds = MockDataSource::new();
        let scope = ConnectionScope::builder("bare")
            .datasource(ds.clone())
            .dialect_kind(DialectKind::Postgres)
            .build()
            .unwrap();
        let err = Db::new(scope)
            .find_first_by_cache("users", "k", "select 1", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SqlRecordError::ConfigError(_)));
    }

    #[tokio::test]
    async fn batch_update_binds_modified_columns_then_key() {
        let ds = MockDataSource::new();
        let db = db(&ds, DialectKind::Postgres);
        let records: Vec<Record> = (1..=3)
            .map(|i| {
                let mut r = Record::from_columns(
                    vec!["id".into(), "name".into(), "age".into()],
                    vec![Value::Long(i), Value::from("n"), Value::Int(1)],
                )
                .unwrap();
                r.set("age", 30);
                r
            })
            .collect();
        let counts = db.batch_update("users", &records, 2).await.unwrap();
        assert_eq!(counts, vec![1, 1, 1]);
        assert!(db.batch_update("users", &[], 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn templates_resolve_and_run() {
        let ds = MockDataSource::new();
        ds.respond("from users", vec!["name"], vec![vec![Value::from("alice")]]);
        let db = db(&ds, DialectKind::Postgres);
        let mut args = HashMap::new();
        args.insert("name".to_string(), Value::from("alice"));
        let template = db.template("user.byName", &args).unwrap();
        assert_eq!(template.para().params(), &[Value::from("alice")]);
        let found = template.find_first().await.unwrap();
        assert_eq!(found.and_then(|r| r.get_str("name").map(str::to_string)).as_deref(), Some("alice"));
        assert!(db.template("missing", &args).is_err());
    }

    #[tokio::test]
    async fn tx_commits_through_the_facade() {
        let ds = MockDataSource::new();
        let db = db(&ds, DialectKind::Postgres);
        let committed = db
            .tx(|| async {
                let mut user = Record::new();
                user.set("name", "carol");
                db.save("users", &mut user).await?;
                db.update_sql("update users set name = ? where id = ?", &[Value::from("c"), Value::Long(1)])
                    .await?;
                Ok(true)
            })
            .await
            .unwrap();
        assert!(committed);
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Acquire)), 1);
        assert_eq!(ds.count(|e| matches!(e, MockEvent::Commit)), 1);
    }
}
