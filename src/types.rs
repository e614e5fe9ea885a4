use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqlRecordError;

/// Values stored in a [`Record`](crate::Record) or bound as statement parameters.
///
/// One enum serves every dialect, so helper code never branches on driver types:
/// ```rust
/// use sql_record::prelude::*;
///
/// let params = vec![
///     Value::Long(1),
///     Value::Text("alice".into()),
///     Value::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Arbitrary-precision decimal, kept in its canonical text form
    Decimal(String),
    /// Text/string value
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// JSON value
    Json(JsonValue),
    /// List value, bound as a native array where the dialect supports it
    Array(Vec<Value>),
    /// Enumeration bound by its variant name
    Enum(String),
}

impl Value {
    /// Bind an enumeration by name.
    pub fn enum_name(name: impl Into<String>) -> Self {
        Value::Enum(name.into())
    }

    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            Value::Decimal(s) | Value::Text(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(_) | Value::Long(_) => self.as_i64().map(|v| v as f64),
            Value::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Enum(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(_) | Value::Long(_) => match self.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::Text(s) => match s.as_str() {
                "true" | "t" | "1" => Some(true),
                "false" | "f" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Timestamp(ts) => Some(ts.date()),
            Value::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let Value::Json(json) = self {
            Some(json)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Render as a JSON value. Temporal values use ISO-8601 text, bytes become a number array.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(v) => JsonValue::from(*v),
            Value::Long(v) => JsonValue::from(*v),
            Value::Float(v) => JsonValue::from(*v),
            Value::Decimal(s) | Value::Text(s) | Value::Enum(s) => JsonValue::String(s.clone()),
            Value::Bytes(bytes) => JsonValue::from(bytes.clone()),
            Value::Date(d) => JsonValue::String(d.to_string()),
            Value::Time(t) => JsonValue::String(t.to_string()),
            Value::Timestamp(ts) => JsonValue::String(ts.format("%F %T%.f").to_string()),
            Value::Json(json) => json.clone(),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    // "YYYY-MM-DD HH:MM:SS", with or without fractional seconds, or ISO "T" separator
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Long,
    f64 => Float,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    JsonValue => Json,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value
where
    T: NotBytes,
{
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Element types that turn a `Vec<T>` into an array value. `u8` is excluded so that
/// `Vec<u8>` keeps meaning bytes.
pub trait NotBytes {}
impl NotBytes for i32 {}
impl NotBytes for i64 {}
impl NotBytes for f64 {}
impl NotBytes for bool {}
impl NotBytes for String {}
impl NotBytes for &str {}
impl NotBytes for Value {}

/// Column type reported by a result cursor or reflected into [`TableMeta`](crate::TableMeta).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Float,
    Double,
    Char,
    Varchar,
    Clob,
    Binary,
    Blob,
    Date,
    Time,
    Timestamp,
    Json,
    Array,
    /// Vendor-specific object type; the payload is the declared sub-type name.
    Other(String),
    Unknown,
}

impl SqlType {
    /// Map a declared column type name (`INTEGER`, `varchar(20)`, `jsonb`, `_int4`, ...) onto a
    /// [`SqlType`]. Affinity rules follow the common subset of SQLite, PostgreSQL and MySQL names.
    #[must_use]
    pub fn from_declared(decl: &str) -> Self {
        let lower = decl.trim().to_ascii_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();
        if base.starts_with('_') || base.ends_with("[]") {
            return SqlType::Array;
        }
        match base {
            "" => SqlType::Unknown,
            "bool" | "boolean" | "bit" => SqlType::Boolean,
            "tinyint" | "smallint" | "int2" => SqlType::SmallInt,
            "int" | "int4" | "integer" | "mediumint" | "serial" => SqlType::Integer,
            "bigint" | "int8" | "bigserial" => SqlType::BigInt,
            "decimal" | "numeric" | "number" => SqlType::Decimal,
            "real" | "float4" => SqlType::Float,
            "float" | "double" | "double precision" | "float8" => SqlType::Double,
            "char" | "bpchar" | "nchar" | "character" => SqlType::Char,
            "varchar" | "nvarchar" | "varchar2" | "character varying" | "text" | "name"
            | "string" => SqlType::Varchar,
            "clob" | "nclob" | "longtext" | "mediumtext" => SqlType::Clob,
            "binary" | "varbinary" | "bytea" | "raw" => SqlType::Binary,
            "blob" | "longblob" | "mediumblob" => SqlType::Blob,
            "date" => SqlType::Date,
            "time" | "timetz" => SqlType::Time,
            "timestamp" | "timestamptz" | "datetime" | "datetime2" => SqlType::Timestamp,
            "json" => SqlType::Json,
            "jsonb" => SqlType::Other("jsonb".to_string()),
            other => {
                if other.contains("int") {
                    SqlType::BigInt
                } else if other.contains("char") || other.contains("text") {
                    SqlType::Varchar
                } else {
                    SqlType::Other(other.to_string())
                }
            }
        }
    }

    /// True for integral column types whose generated keys need width coercion.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        matches!(self, SqlType::SmallInt | SqlType::Integer | SqlType::BigInt)
    }
}

/// Transaction isolation levels, ordered from weakest to strictest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, ValueEnum)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL keyword form, e.g. `READ COMMITTED`.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Built-in dialects, selectable by name at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DialectKind {
    Mysql,
    Postgres,
    Sqlite,
    Oracle,
    Sqlserver,
    Ansi,
}

impl FromStr for DialectKind {
    type Err = SqlRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <DialectKind as ValueEnum>::from_str(s, true)
            .map_err(|_| SqlRecordError::ConfigError(format!("unknown dialect: {s}")))
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// Case applied to column labels when result rows are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColumnCase {
    #[default]
    AsIs,
    Lower,
    Upper,
}

impl ColumnCase {
    #[must_use]
    pub fn apply(self, label: &str) -> String {
        match self {
            ColumnCase::AsIs => label.to_string(),
            ColumnCase::Lower => label.to_lowercase(),
            ColumnCase::Upper => label.to_uppercase(),
        }
    }
}
