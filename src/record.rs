use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{Result, SqlRecordError};
use crate::types::Value;

/// A dynamic row: ordered column labels, their values, and the set of columns changed
/// through [`Record::set`] since creation or the last save.
///
/// ```rust
/// use sql_record::prelude::*;
///
/// let mut user = Record::new();
/// user.set("name", "alice").set("age", 30);
/// assert_eq!(user.get_str("name"), Some("alice"));
/// assert!(user.modified_keys().contains("age"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
    #[serde(skip)]
    modified: HashSet<String>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an unmodified record from parallel column/value vectors, as produced by a query.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ExecutionError` if the vectors differ in length.
    pub fn from_columns(columns: Vec<String>, values: Vec<Value>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(SqlRecordError::ExecutionError(format!(
                "column count {} does not match value count {}",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self {
            columns,
            values,
            modified: HashSet::new(),
        })
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Set a column value and mark it modified.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.position(&column) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.columns.push(column.clone());
                self.values.push(value);
            }
        }
        self.modified.insert(column);
        self
    }

    /// Store a value without marking the column modified; used when applying generated keys.
    pub(crate) fn put_unmodified(&mut self, column: &str, value: Value) {
        match self.position(column) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.columns.push(column.to_string());
                self.values.push(value);
            }
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|idx| &self.values[idx])
    }

    /// Column value, or `None` when the column is absent or NULL.
    fn non_null(&self, column: &str) -> Option<&Value> {
        self.get(column).filter(|v| !v.is_null())
    }

    #[must_use]
    pub fn get_int(&self, column: &str) -> Option<i32> {
        self.non_null(column).and_then(Value::as_i32)
    }

    #[must_use]
    pub fn get_long(&self, column: &str) -> Option<i64> {
        self.non_null(column).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.non_null(column).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.non_null(column).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.non_null(column).and_then(Value::as_f64)
    }

    /// Decimal columns in canonical text form. Integral values are rendered as text too.
    #[must_use]
    pub fn get_decimal(&self, column: &str) -> Option<String> {
        match self.non_null(column)? {
            Value::Decimal(s) | Value::Text(s) => Some(s.clone()),
            Value::Int(v) => Some(v.to_string()),
            Value::Long(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_bytes(&self, column: &str) -> Option<&[u8]> {
        self.non_null(column).and_then(Value::as_bytes)
    }

    #[must_use]
    pub fn get_timestamp(&self, column: &str) -> Option<NaiveDateTime> {
        self.non_null(column).and_then(Value::as_timestamp)
    }

    #[must_use]
    pub fn get_date(&self, column: &str) -> Option<NaiveDate> {
        self.non_null(column).and_then(Value::as_date)
    }

    #[must_use]
    pub fn get_json(&self, column: &str) -> Option<&JsonValue> {
        self.non_null(column).and_then(Value::as_json)
    }

    #[must_use]
    pub fn get_array(&self, column: &str) -> Option<&[Value]> {
        self.non_null(column).and_then(Value::as_array)
    }

    /// Remove a column, returning its value. The column also leaves the modified set.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.position(column)?;
        self.columns.remove(idx);
        self.modified.remove(column);
        Some(self.values.remove(idx))
    }

    pub fn remove_many<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        for column in columns {
            self.remove(column.as_ref());
        }
        self
    }

    pub fn remove_null_value_columns(&mut self) -> &mut Self {
        let nulls: Vec<String> = self
            .columns
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| v.is_null())
            .map(|(c, _)| c.clone())
            .collect();
        self.remove_many(&nulls)
    }

    /// Retain only the named columns.
    pub fn keep<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        let drop: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !columns.iter().any(|k| k.as_ref() == c.as_str()))
            .cloned()
            .collect();
        self.remove_many(&drop)
    }

    pub fn clear(&mut self) -> &mut Self {
        self.columns.clear();
        self.values.clear();
        self.modified.clear();
        self
    }

    /// Copy every column of `other` into this record, marking each modified.
    pub fn set_columns(&mut self, other: &Record) -> &mut Self {
        for (column, value) in other.iter() {
            self.set(column, value.clone());
        }
        self
    }

    pub fn clear_modified(&mut self) {
        self.modified.clear();
    }

    #[must_use]
    pub fn modified_keys(&self) -> &HashSet<String> {
        &self.modified
    }

    #[must_use]
    pub fn is_modified(&self, column: &str) -> bool {
        self.modified.contains(column)
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn column_values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(&self.values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render the record as a JSON object in column order.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.columns.len());
        for (column, value) in self.iter() {
            map.insert(column.to_string(), value.to_json());
        }
        JsonValue::Object(map)
    }
}

/// Records compare by column values; column order and the modified set are ignored.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(c, v)| other.get(c) == Some(v))
    }
}

/// Explicit conversion from a dynamic row into a caller-defined type.
///
/// ```rust
/// use sql_record::prelude::*;
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl FromRecord for User {
///     fn from_record(record: &Record) -> Result<Self, SqlRecordError> {
///         Ok(User {
///             id: record.get_long("id").ok_or_else(|| missing("id"))?,
///             name: record.get_str("name").unwrap_or_default().to_string(),
///         })
///     }
/// }
///
/// fn missing(column: &str) -> SqlRecordError {
///     SqlRecordError::ExecutionError(format!("missing column {column}"))
/// }
/// ```
pub trait FromRecord: Sized {
    /// # Errors
    /// Returns an error when the record lacks a required column or holds an incompatible value.
    fn from_record(record: &Record) -> Result<Self>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> Result<Self> {
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_remove_track_modified_keys() {
        let mut r = Record::new();
        r.set("x", 1);
        assert_eq!(r.get("x"), Some(&Value::Int(1)));
        assert!(r.is_modified("x"));

        r.remove("x");
        assert!(r.get("x").is_none());
        assert!(!r.modified_keys().contains("x"));
    }

    #[test]
    fn rows_from_queries_start_unmodified() {
        let r = Record::from_columns(vec!["id".into()], vec![Value::Long(3)]).unwrap();
        assert!(r.modified_keys().is_empty());
        assert_eq!(r.get_long("id"), Some(3));
        assert!(Record::from_columns(vec!["a".into()], vec![]).is_err());
    }

    #[test]
    fn keep_and_null_removal() {
        let mut r = Record::new();
        r.set("a", 1).set("b", Value::Null).set("c", "x");
        r.remove_null_value_columns();
        assert_eq!(r.column_names(), &["a".to_string(), "c".to_string()]);
        r.keep(&["c"]);
        assert_eq!(r.column_names(), &["c".to_string()]);
        assert_eq!(r.modified_keys().len(), 1);
    }

    #[test]
    fn equality_ignores_column_order() {
        let mut a = Record::new();
        a.set("id", 1_i64).set("name", "n");
        let mut b = Record::new();
        b.set("name", "n");
        b.put_unmodified("id", Value::Long(1));
        assert_eq!(a, b);
    }

    #[test]
    fn json_rendering_keeps_nested_values() {
        let mut r = Record::new();
        r.set("id", 5_i64)
            .set("tags", Value::Array(vec!["a".into(), "b".into()]))
            .set("doc", serde_json::json!({"k": true}));
        assert_eq!(
            r.to_json(),
            serde_json::json!({"id": 5, "tags": ["a", "b"], "doc": {"k": true}})
        );
    }
}
