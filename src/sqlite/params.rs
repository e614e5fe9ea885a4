use rusqlite::types::Value as SqliteValue;

use crate::types::Value;

/// Map a bound parameter onto `SQLite` storage classes. Values arrive already coerced by the
/// dialect; anything still structured is stored as text.
#[must_use]
pub fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Long(v) => SqliteValue::Integer(*v),
        Value::Float(v) => SqliteValue::Real(*v),
        Value::Decimal(s) | Value::Text(s) | Value::Enum(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Date(d) => SqliteValue::Text(d.format("%F").to_string()),
        Value::Time(t) => SqliteValue::Text(t.format("%T%.f").to_string()),
        Value::Timestamp(ts) => SqliteValue::Text(ts.format("%F %T%.f").to_string()),
        Value::Json(j) => SqliteValue::Text(j.to_string()),
        Value::Array(_) => SqliteValue::Text(value.to_json().to_string()),
    }
}

#[must_use]
pub fn convert(params: &[Value]) -> Vec<SqliteValue> {
    params.iter().map(to_sqlite).collect()
}
