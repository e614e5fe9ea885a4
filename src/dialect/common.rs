//! Helpers shared by every dialect: key parsing, column selection, binding coercion.

use std::sync::LazyLock;

use regex::Regex;

use super::{BindCapabilities, Dialect};
use crate::error::{Result, SqlRecordError};
use crate::record::Record;
use crate::types::{SqlType, Value};

static ORDER_BY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    match Regex::new(
        r"(?i)order\s+by\s+[^,\s]+(\s+desc|\s+asc)?(\s*,\s*[^,\s]+(\s+desc|\s+asc)?)*",
    ) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(error = %e, "ORDER BY pattern failed to compile; count queries keep ORDER BY");
            None
        }
    }
});

/// Split a primary-key spec such as `"user_id, role_id"` into trimmed column names.
///
/// # Errors
/// Returns `SqlRecordError::ConfigError` for an empty spec or an empty column name.
pub fn parse_primary_key(spec: &str) -> Result<Vec<String>> {
    let columns = trim_primary_keys(spec.split(','));
    if columns.iter().any(String::is_empty) {
        return Err(SqlRecordError::ConfigError(format!(
            "malformed primary key: {spec:?}"
        )));
    }
    Ok(columns)
}

pub fn trim_primary_keys<'a>(columns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    columns.into_iter().map(|c| c.trim().to_string()).collect()
}

/// Require one id value per primary-key column.
///
/// # Errors
/// Returns `SqlRecordError::ConfigError` when the counts differ.
pub fn check_key_count(primary_key: &[String], ids: &[Value]) -> Result<()> {
    if primary_key.len() == ids.len() {
        Ok(())
    } else {
        Err(SqlRecordError::ConfigError(format!(
            "primary key {primary_key:?} needs {} value(s), got {}",
            primary_key.len(),
            ids.len()
        )))
    }
}

/// Quote `ident` with the given delimiters, doubling embedded closing delimiters. Qualified
/// names are quoted part by part.
#[must_use]
pub fn quote_with(ident: &str, open: char, close: char) -> String {
    ident
        .split('.')
        .map(|part| {
            let escaped = part.replace(close, &format!("{close}{close}"));
            format!("{open}{escaped}{close}")
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// `"a" = ? and "b" = ?`
pub fn where_primary_keys<D: Dialect + ?Sized>(dialect: &D, primary_key: &[String]) -> String {
    primary_key
        .iter()
        .map(|c| format!("{} = ?", dialect.quote(c)))
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Record columns an INSERT names: all of them except primary-key columns holding NULL.
#[must_use]
pub fn insert_columns(primary_key: &[String], record: &Record) -> Vec<String> {
    record
        .iter()
        .filter(|(c, v)| !(v.is_null() && is_key(primary_key, c)))
        .map(|(c, _)| c.to_string())
        .collect()
}

/// Modified columns outside the primary key, in record column order.
#[must_use]
pub fn update_columns(primary_key: &[String], record: &Record) -> Vec<String> {
    record
        .column_names()
        .iter()
        .filter(|c| record.is_modified(c) && !is_key(primary_key, c))
        .cloned()
        .collect()
}

#[must_use]
pub fn non_key_columns(primary_key: &[String], record: &Record) -> Vec<String> {
    record
        .column_names()
        .iter()
        .filter(|c| !is_key(primary_key, c))
        .cloned()
        .collect()
}

/// Key columns match record columns ignoring ASCII case.
fn is_key(primary_key: &[String], column: &str) -> bool {
    primary_key.iter().any(|k| k.eq_ignore_ascii_case(column))
}

fn key_value<'r>(record: &'r Record, key: &str) -> Option<&'r Value> {
    record.get(key).or_else(|| {
        record
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Values of `columns` in order.
///
/// # Errors
/// Returns `SqlRecordError::ParameterError` naming the first missing column.
pub fn values_for(record: &Record, columns: &[String]) -> Result<Vec<Value>> {
    columns
        .iter()
        .map(|c| {
            record.get(c).cloned().ok_or_else(|| {
                SqlRecordError::ParameterError(format!("record has no value for column {c}"))
            })
        })
        .collect()
}

/// Primary-key values of `record` in key order; each must be present and non-NULL.
///
/// # Errors
/// Returns `SqlRecordError::ConfigError` if a key column is missing or NULL.
pub fn primary_key_values(primary_key: &[String], record: &Record) -> Result<Vec<Value>> {
    primary_key
        .iter()
        .map(|k| match key_value(record, k) {
            Some(v) if !v.is_null() => Ok(v.clone()),
            _ => Err(SqlRecordError::ConfigError(format!(
                "primary key column {k} has no value"
            ))),
        })
        .collect()
}

pub fn insert_sql<D: Dialect + ?Sized>(dialect: &D, table: &str, columns: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| dialect.quote(c)).collect();
    let marks = vec!["?"; columns.len()];
    format!(
        "insert into {}({}) values({})",
        dialect.quote(table),
        names.join(", "),
        marks.join(", ")
    )
}

pub fn update_sql<D: Dialect + ?Sized>(
    dialect: &D,
    table: &str,
    set_columns: &[String],
    primary_key: &[String],
) -> String {
    let sets: Vec<String> = set_columns
        .iter()
        .map(|c| format!("{} = ?", dialect.quote(c)))
        .collect();
    format!(
        "update {} set {} where {}",
        dialect.quote(table),
        sets.join(", "),
        where_primary_keys(dialect, primary_key)
    )
}

#[must_use]
pub fn strip_order_by(sql: &str) -> String {
    match ORDER_BY.as_ref() {
        Some(regex) => regex.replace_all(sql, "").into_owned(),
        None => sql.to_string(),
    }
}

#[must_use]
pub fn has_order_by(sql: &str) -> bool {
    match ORDER_BY.as_ref() {
        Some(regex) => regex.is_match(sql),
        None => sql.to_ascii_lowercase().contains("order by"),
    }
}

#[must_use]
pub fn page_offset(page_number: u64, page_size: u64) -> u64 {
    page_number.saturating_sub(1).saturating_mul(page_size)
}

/// Coerce one parameter to what a database with `caps` binds.
#[must_use]
pub fn bind_value(value: &Value, caps: BindCapabilities) -> Value {
    match value {
        Value::Array(items) if !caps.arrays => {
            Value::Text(Value::Array(items.clone()).to_json().to_string())
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| bind_value(v, caps)).collect()),
        Value::Json(json) if !caps.json => Value::Text(json.to_string()),
        Value::Bool(b) if !caps.booleans => Value::Int(i32::from(*b)),
        Value::Date(d) if !caps.temporal => Value::Text(d.format("%F").to_string()),
        Value::Time(t) if !caps.temporal => Value::Text(t.format("%T%.f").to_string()),
        Value::Timestamp(ts) if !caps.temporal => Value::Text(ts.format("%F %T%.f").to_string()),
        Value::Enum(name) if !caps.enums => Value::Text(name.clone()),
        other => other.clone(),
    }
}

/// Fit a generated key to its column: 32-bit for INTEGER/SMALLINT, 64-bit for BIGINT,
/// integral decimal text for DECIMAL/NUMERIC. Values that do not fit are left as they are.
#[must_use]
pub fn coerce_key(value: Value, column_type: Option<&SqlType>) -> Value {
    let Some(column_type) = column_type else {
        return value;
    };
    match column_type {
        SqlType::SmallInt | SqlType::Integer => value.as_i32().map_or(value, Value::Int),
        SqlType::BigInt => value.as_i64().map_or(value, Value::Long),
        SqlType::Decimal => match &value {
            Value::Int(v) => Value::Decimal(v.to_string()),
            Value::Long(v) => Value::Decimal(v.to_string()),
            Value::Text(s) => Value::Decimal(s.clone()),
            _ => value,
        },
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn parses_composite_keys() {
        assert_eq!(
            parse_primary_key(" user_id , role_id").unwrap(),
            vec!["user_id", "role_id"]
        );
        assert!(parse_primary_key("a,,b").is_err());
        assert!(parse_primary_key("  ").is_err());
    }

    #[test]
    fn key_count_must_match() {
        let pk = vec!["a".to_string(), "b".to_string()];
        assert!(check_key_count(&pk, &[Value::Int(1)]).is_err());
        assert!(check_key_count(&pk, &[Value::Int(1), Value::Int(2)]).is_ok());
    }

    #[test]
    fn quoting_escapes_and_splits_qualified_names() {
        assert_eq!(quote_with("public.my\"t", '"', '"'), r#""public"."my""t""#);
        assert_eq!(quote_with("t", '[', ']'), "[t]");
    }

    #[test]
    fn textual_binding_encodes_rich_values() {
        let caps = BindCapabilities::TEXTUAL;
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(bind_value(&Value::Bool(true), caps), Value::Int(1));
        assert_eq!(bind_value(&Value::Date(day), caps), Value::Text("2024-02-29".into()));
        assert_eq!(
            bind_value(&Value::Array(vec![Value::Int(1), Value::Int(2)]), caps),
            Value::Text("[1,2]".into())
        );
        assert_eq!(bind_value(&Value::enum_name("RED"), caps), Value::Text("RED".into()));
        assert_eq!(
            bind_value(&Value::Json(serde_json::json!({"a": 1})), BindCapabilities::NATIVE),
            Value::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn generated_keys_fit_their_columns() {
        assert_eq!(coerce_key(Value::Long(5), Some(&SqlType::Integer)), Value::Int(5));
        assert_eq!(coerce_key(Value::Int(5), Some(&SqlType::BigInt)), Value::Long(5));
        assert_eq!(
            coerce_key(Value::Long(5), Some(&SqlType::Decimal)),
            Value::Decimal("5".into())
        );
        assert_eq!(
            coerce_key(Value::Long(i64::MAX), Some(&SqlType::Integer)),
            Value::Long(i64::MAX)
        );
        assert_eq!(coerce_key(Value::Long(5), None), Value::Long(5));
    }

    #[test]
    fn key_columns_match_records_ignoring_case() {
        let pk = vec!["ID".to_string()];
        let mut record = Record::new();
        record.set("id", Value::Null).set("name", "a");
        assert_eq!(insert_columns(&pk, &record), vec!["name"]);

        record.set("id", 7_i64);
        assert_eq!(primary_key_values(&pk, &record).unwrap(), vec![Value::Long(7)]);
        assert_eq!(update_columns(&pk, &record), vec!["name"]);
    }
}
