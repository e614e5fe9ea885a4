//! Table metadata reflected from the live schema.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::cursor::ColumnInfo;
use crate::dialect::common::parse_primary_key;
use crate::error::{Result, SqlRecordError};
use crate::executor::QueryExecutor;
use crate::scope::ConnectionScope;
use crate::types::SqlType;

/// A table's name, ordered primary-key columns and column types. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    name: String,
    primary_key: Vec<String>,
    columns: Vec<(String, SqlType)>,
}

impl TableMeta {
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when the key is empty or names a column the
    /// table does not have.
    pub fn new(
        name: impl Into<String>,
        primary_key: Vec<String>,
        columns: Vec<(String, SqlType)>,
    ) -> Result<Self> {
        let name = name.into();
        if primary_key.is_empty() {
            return Err(SqlRecordError::ConfigError(format!(
                "table {name}: primary key is required"
            )));
        }
        // Keys take the spelling of the reflected column they name.
        let primary_key = primary_key
            .iter()
            .map(|key| {
                columns
                    .iter()
                    .find(|(c, _)| c.eq_ignore_ascii_case(key))
                    .map(|(c, _)| c.clone())
                    .ok_or_else(|| {
                        SqlRecordError::ConfigError(format!(
                            "table {name}: primary key column {key} does not exist"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name,
            primary_key,
            columns,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key columns in the order composite ids are passed positionally.
    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    #[must_use]
    pub fn columns(&self) -> &[(String, SqlType)] {
        &self.columns
    }

    #[must_use]
    pub fn column_type(&self, column: &str) -> Option<&SqlType> {
        self.columns
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(column))
            .map(|(_, t)| t)
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.column_type(column).is_some()
    }
}

/// Tables registered on a scope, looked up case-insensitively.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: RwLock<HashMap<String, Arc<TableMeta>>>,
}

impl TableRegistry {
    #[must_use]
    pub fn get(&self, table: &str) -> Option<Arc<TableMeta>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&table.to_lowercase())
            .cloned()
    }

    pub fn insert(&self, meta: TableMeta) -> Arc<TableMeta> {
        let meta = Arc::new(meta);
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(meta.name().to_lowercase(), Arc::clone(&meta));
        meta
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reflects tables by running the dialect's empty reflection query and reading the cursor's
/// column metadata.
pub struct TableBuilder<'a> {
    scope: &'a ConnectionScope,
}

impl<'a> TableBuilder<'a> {
    #[must_use]
    pub fn new(scope: &'a ConnectionScope) -> Self {
        Self { scope }
    }

    /// Reflect `table` and register it. `primary_key` is a comma-separated spec; `None` uses
    /// the dialect's default key column.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for a malformed or unknown key, and statement
    /// errors from the reflection query.
    pub async fn build(&self, table: &str, primary_key: Option<&str>) -> Result<Arc<TableMeta>> {
        let dialect = self.scope.dialect();
        let primary_key = match primary_key {
            Some(spec) => parse_primary_key(spec)?,
            None => vec![dialect.default_primary_key().to_string()],
        };
        let reflect = dialect.for_table_builder_do_build(table);
        let columns = QueryExecutor::new(self.scope).describe(&reflect).await?;
        let meta = TableMeta::new(table, primary_key, columns.into_iter().map(split).collect())?;
        tracing::debug!(
            scope = self.scope.name(),
            table = meta.name(),
            columns = meta.columns().len(),
            "Table registered"
        );
        Ok(self.scope.tables().insert(meta))
    }
}

fn split(column: ColumnInfo) -> (String, SqlType) {
    (column.label, column.sql_type)
}
