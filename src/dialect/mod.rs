//! SQL generation and parameter binding per database.
//!
//! [`Dialect`] carries default implementations for everything that is the same across
//! databases; the reference dialects override quoting, paging and binding details only.
//! Generated statements always use `?` placeholders. Drivers that need numbered
//! placeholders rewrite them (see [`crate::translation`]).

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::record::Record;
use crate::sql_para::SqlPara;
use crate::types::{DialectKind, SqlType, Value};

pub mod common;

mod ansi;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;
mod sqlserver;

pub use ansi::AnsiDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

/// Which value kinds a database binds natively. Everything else is coerced by
/// [`common::bind_value`] before it reaches the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindCapabilities {
    pub arrays: bool,
    pub json: bool,
    pub booleans: bool,
    pub temporal: bool,
    pub enums: bool,
}

impl BindCapabilities {
    /// Everything bound as the driver's native type.
    pub const NATIVE: Self = Self {
        arrays: true,
        json: true,
        booleans: true,
        temporal: true,
        enums: true,
    };

    /// Arrays and JSON as encoded text, enums by name; booleans and temporal values native.
    pub const STANDARD: Self = Self {
        arrays: false,
        json: false,
        booleans: true,
        temporal: true,
        enums: false,
    };

    /// Everything except numbers, text and bytes bound as text or integers.
    pub const TEXTUAL: Self = Self {
        arrays: false,
        json: false,
        booleans: false,
        temporal: false,
        enums: false,
    };
}

/// When generated keys are read back after an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKeyPolicy {
    /// Only primary-key columns the record left unset or NULL.
    UnsetOnly,
    /// Every primary-key column, for databases whose identity columns cannot be set by
    /// the client.
    Always,
}

/// A batch statement together with the record columns bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub sql: String,
    pub columns: Vec<String>,
}

impl BatchPlan {
    /// Parameter row for `record`, in placeholder order.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ParameterError` if the record lacks one of the plan's columns.
    pub fn bind(&self, record: &Record) -> Result<Vec<Value>> {
        common::values_for(record, &self.columns)
    }
}

/// Per-database strategy for SQL text and parameter binding.
///
/// A custom dialect implements [`Dialect::name`] and overrides whatever differs:
/// ```rust
/// use sql_record::prelude::*;
///
/// #[derive(Debug)]
/// struct Db2;
///
/// impl Dialect for Db2 {
///     fn name(&self) -> &'static str {
///         "db2"
///     }
///
///     fn for_paginate(&self, page_number: u64, page_size: u64, find_sql: &str) -> String {
///         let offset = (page_number - 1) * page_size;
///         format!("{find_sql} offset {offset} rows fetch first {page_size} rows only")
///     }
/// }
///
/// let sql = Db2.for_db_find_by_id("users", &["id".to_string()], "*");
/// assert_eq!(sql, r#"select * from "users" where "id" = ?"#);
/// ```
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Quote an identifier, part by part for qualified names.
    fn quote(&self, ident: &str) -> String {
        common::quote_with(ident, '"', '"')
    }

    fn default_primary_key(&self) -> &'static str {
        "id"
    }

    fn bind_capabilities(&self) -> BindCapabilities {
        BindCapabilities::STANDARD
    }

    /// Map parameters onto the types this database binds.
    fn fill_statement(&self, params: &[Value]) -> Vec<Value> {
        let caps = self.bind_capabilities();
        params.iter().map(|v| common::bind_value(v, caps)).collect()
    }

    /// Probe query whose cursor describes a table's columns without returning rows.
    fn for_table_builder_do_build(&self, table: &str) -> String {
        format!("select * from {} where 1 = 2", self.quote(table))
    }

    fn for_db_find_by_id(&self, table: &str, primary_key: &[String], columns: &str) -> String {
        format!(
            "select {columns} from {} where {}",
            self.quote(table),
            common::where_primary_keys(self, primary_key)
        )
    }

    fn for_db_delete_by_id(&self, table: &str, primary_key: &[String]) -> String {
        format!(
            "delete from {} where {}",
            self.quote(table),
            common::where_primary_keys(self, primary_key)
        )
    }

    fn for_db_exists_by_id(&self, table: &str, primary_key: &[String]) -> String {
        format!(
            "select count(*) from {} where {}",
            self.quote(table),
            common::where_primary_keys(self, primary_key)
        )
    }

    /// INSERT for every column of `record` except primary-key columns holding NULL.
    fn for_db_save(&self, table: &str, primary_key: &[String], record: &Record) -> SqlPara {
        let columns = common::insert_columns(primary_key, record);
        let values = columns
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        SqlPara::new(common::insert_sql(self, table, &columns), values)
    }

    /// UPDATE of the modified non-key columns, keyed by the primary key. `Ok(None)` when no
    /// such column was modified.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` if the record lacks a primary-key value.
    fn for_db_update(
        &self,
        table: &str,
        primary_key: &[String],
        record: &Record,
    ) -> Result<Option<SqlPara>> {
        let columns = common::update_columns(primary_key, record);
        if columns.is_empty() {
            return Ok(None);
        }
        let mut params = common::values_for(record, &columns)?;
        params.extend(common::primary_key_values(primary_key, record)?);
        Ok(Some(SqlPara::new(
            common::update_sql(self, table, &columns, primary_key),
            params,
        )))
    }

    /// INSERT shared by every record of a batch, shaped by the first record.
    fn for_batch_save(&self, table: &str, primary_key: &[String], first: &Record) -> BatchPlan {
        let columns = common::insert_columns(primary_key, first);
        BatchPlan {
            sql: common::insert_sql(self, table, &columns),
            columns,
        }
    }

    /// UPDATE shared by every record of a batch: the first record's modified non-key
    /// columns (all non-key columns if none were modified), then the primary key.
    fn for_batch_update(&self, table: &str, primary_key: &[String], first: &Record) -> BatchPlan {
        let mut set_columns = common::update_columns(primary_key, first);
        if set_columns.is_empty() {
            set_columns = common::non_key_columns(primary_key, first);
        }
        let sql = common::update_sql(self, table, &set_columns, primary_key);
        let mut columns = set_columns;
        columns.extend(primary_key.iter().cloned());
        BatchPlan { sql, columns }
    }

    /// Count query for `select ... <sql_except_select>`. ORDER BY clauses are dropped.
    fn for_total_row(&self, sql_except_select: &str) -> String {
        format!("select count(*) {}", common::strip_order_by(sql_except_select))
    }

    /// Bound the full find query to one page. `page_number` starts at 1.
    fn for_paginate(&self, page_number: u64, page_size: u64, find_sql: &str) -> String {
        let offset = common::page_offset(page_number, page_size);
        format!("{find_sql} limit {page_size} offset {offset}")
    }

    /// True when pagination walks the cursor instead of windowing the SQL.
    fn takes_over_paginate(&self) -> bool {
        false
    }

    fn generated_key_policy(&self) -> GeneratedKeyPolicy {
        GeneratedKeyPolicy::UnsetOnly
    }

    /// Primary-key columns to read back after inserting `record`.
    fn generated_key_columns(&self, primary_key: &[String], record: &Record) -> Vec<String> {
        match self.generated_key_policy() {
            GeneratedKeyPolicy::Always => primary_key.to_vec(),
            GeneratedKeyPolicy::UnsetOnly => primary_key
                .iter()
                .filter(|c| record.get(c).is_none_or(Value::is_null))
                .cloned()
                .collect(),
        }
    }

    /// Fit a generated key to the width of its column.
    fn coerce_generated_key(&self, value: Value, column_type: Option<&SqlType>) -> Value {
        common::coerce_key(value, column_type)
    }
}

/// Reference dialect for `kind`.
#[must_use]
pub fn for_kind(kind: DialectKind) -> Arc<dyn Dialect> {
    match kind {
        DialectKind::Mysql => Arc::new(MysqlDialect),
        DialectKind::Postgres => Arc::new(PostgresDialect),
        DialectKind::Sqlite => Arc::new(SqliteDialect),
        DialectKind::Oracle => Arc::new(OracleDialect),
        DialectKind::Sqlserver => Arc::new(SqlServerDialect),
        DialectKind::Ansi => Arc::new(AnsiDialect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk() -> Vec<String> {
        vec!["id".to_string()]
    }

    fn user() -> Record {
        let mut r = Record::new();
        r.set("id", Value::Null).set("name", "a").set("age", 3);
        r
    }

    #[test]
    fn save_skips_null_primary_key() {
        let para = SqliteDialect.for_db_save("users", &pk(), &user());
        assert_eq!(
            para.sql(),
            r#"insert into "users"("name", "age") values(?, ?)"#
        );
        assert_eq!(para.params(), &[Value::Text("a".into()), Value::Int(3)]);
    }

    #[test]
    fn update_touches_only_modified_non_key_columns() {
        let mut r = Record::from_columns(
            vec!["id".into(), "name".into(), "age".into()],
            vec![Value::Long(7), Value::Text("a".into()), Value::Int(1)],
        )
        .unwrap();
        assert!(MysqlDialect.for_db_update("users", &pk(), &r).unwrap().is_none());

        r.set("age", 2);
        let para = MysqlDialect.for_db_update("users", &pk(), &r).unwrap().unwrap();
        assert_eq!(para.sql(), "update `users` set `age` = ? where `id` = ?");
        assert_eq!(para.params(), &[Value::Int(2), Value::Long(7)]);
    }

    #[test]
    fn update_requires_primary_key_value() {
        let mut r = Record::new();
        r.set("name", "x");
        assert!(PostgresDialect.for_db_update("users", &pk(), &r).is_err());
    }

    #[test]
    fn batch_binding_order_matches_generated_insert_columns() {
        let first = user();
        let plan = PostgresDialect.for_batch_save("users", &pk(), &first);
        assert_eq!(plan.sql, r#"insert into "users"("name", "age") values(?, ?)"#);

        let mut other = Record::new();
        other.set("age", 9).set("name", "b");
        assert_eq!(
            plan.bind(&other).unwrap(),
            vec![Value::Text("b".into()), Value::Int(9)]
        );
    }

    #[test]
    fn batch_binding_order_matches_generated_update_columns() {
        let mut first = Record::from_columns(
            vec!["id".into(), "name".into(), "age".into()],
            vec![Value::Long(1), Value::Text("a".into()), Value::Int(1)],
        )
        .unwrap();
        first.set("age", 5).set("name", "z");
        let plan = SqliteDialect.for_batch_update("users", &pk(), &first);
        assert_eq!(
            plan.sql,
            r#"update "users" set "name" = ?, "age" = ? where "id" = ?"#
        );
        assert_eq!(plan.columns, vec!["name", "age", "id"]);
        assert_eq!(
            plan.bind(&first).unwrap(),
            vec![Value::Text("z".into()), Value::Int(5), Value::Long(1)]
        );
    }

    #[test]
    fn offset_paging_windows() {
        assert_eq!(
            PostgresDialect.for_paginate(2, 10, "select * from t"),
            "select * from t limit 10 offset 10"
        );
        assert_eq!(
            MysqlDialect.for_paginate(2, 10, "select * from t"),
            "select * from t limit 10, 10"
        );
    }

    #[test]
    fn total_row_drops_order_by() {
        assert_eq!(
            SqliteDialect.for_total_row("from t where a = ? order by b desc"),
            "select count(*) from t where a = ? "
        );
    }

    #[test]
    fn unset_keys_are_selected_for_read_back() {
        let keys = SqliteDialect.generated_key_columns(&pk(), &user());
        assert_eq!(keys, pk());
        let mut set = user();
        set.set("id", 5);
        assert!(SqliteDialect.generated_key_columns(&pk(), &set).is_empty());
        assert_eq!(OracleDialect.generated_key_columns(&pk(), &set), pk());
    }

    #[test]
    fn kinds_map_to_named_dialects() {
        assert_eq!(for_kind(DialectKind::Sqlserver).name(), "sqlserver");
        assert_eq!(for_kind(DialectKind::Oracle).name(), "oracle");
    }
}
