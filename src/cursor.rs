use std::collections::VecDeque;
use std::fmt;
use std::io::Read;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::types::SqlType;

/// Column metadata reported by a result cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub label: String,
    pub sql_type: SqlType,
    /// Vendor type name as reported by the driver (`int4`, `jsonb`, `TEXT`, ...).
    pub type_name: String,
}

impl ColumnInfo {
    #[must_use]
    pub fn new(label: impl Into<String>, sql_type: SqlType, type_name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sql_type,
            type_name: type_name.into(),
        }
    }
}

/// A cell as a driver hands it over, before record decoding.
///
/// Large-object variants carry a live reader that must be drained before the
/// cursor advances.
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f64),
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Json(JsonValue),
    Clob(Box<dyn Read + Send>),
    Blob(Box<dyn Read + Send>),
    /// Vendor object value with its declared sub-type (`json`, `jsonb`, `inet`, ...).
    Other {
        type_name: String,
        value: Option<String>,
    },
    Array(Vec<RawValue>),
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("Null"),
            RawValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            RawValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            RawValue::Long(v) => f.debug_tuple("Long").field(v).finish(),
            RawValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            RawValue::Decimal(v) => f.debug_tuple("Decimal").field(v).finish(),
            RawValue::Text(v) => f.debug_tuple("Text").field(v).finish(),
            RawValue::Bytes(v) => f.debug_tuple("Bytes").field(&v.len()).finish(),
            RawValue::Date(v) => f.debug_tuple("Date").field(v).finish(),
            RawValue::Time(v) => f.debug_tuple("Time").field(v).finish(),
            RawValue::Timestamp(v) => f.debug_tuple("Timestamp").field(v).finish(),
            RawValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            RawValue::Clob(_) => f.write_str("Clob(<reader>)"),
            RawValue::Blob(_) => f.write_str("Blob(<reader>)"),
            RawValue::Other { type_name, value } => f
                .debug_struct("Other")
                .field("type_name", type_name)
                .field("value", value)
                .finish(),
            RawValue::Array(v) => f.debug_tuple("Array").field(v).finish(),
        }
    }
}

/// Forward-only access to a statement's result rows.
///
/// A cursor keeps its statement open until it is dropped; rows are fetched as `next_row` is
/// awaited, so dropping it early leaves the remainder unread.
#[async_trait]
pub trait ResultCursor: Send {
    fn columns(&self) -> &[ColumnInfo];

    /// Advance to the next row. `Ok(None)` marks the end of the result.
    ///
    /// # Errors
    /// Returns the driver error raised while fetching or decoding the row.
    async fn next_row(&mut self) -> Result<Option<Vec<RawValue>>>;
}

/// A cursor over rows that were fetched up front.
#[derive(Debug, Default)]
pub struct VecCursor {
    columns: Vec<ColumnInfo>,
    rows: VecDeque<Vec<RawValue>>,
}

impl VecCursor {
    #[must_use]
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<RawValue>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// Rows not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl ResultCursor for VecCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<RawValue>>> {
        Ok(self.rows.pop_front())
    }
}
