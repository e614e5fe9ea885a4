//! Materialization of cursor rows into [`Record`]s.
//!
//! Decoding depends only on the cursor's column metadata, never on the SQL that produced it,
//! so every driver and dialect shares it.

use std::io::Read;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use crate::cursor::{ColumnInfo, RawValue, ResultCursor};
use crate::error::{Result, SqlRecordError};
use crate::record::Record;
use crate::types::{ColumnCase, SqlType, Value, parse_timestamp};

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordBuilder {
    column_case: ColumnCase,
}

impl RecordBuilder {
    #[must_use]
    pub fn new(column_case: ColumnCase) -> Self {
        Self { column_case }
    }

    /// Drain the cursor into records.
    ///
    /// # Errors
    /// Returns cursor fetch errors and large-object read errors.
    pub async fn build(&self, cursor: &mut dyn ResultCursor) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        self.build_each(cursor, &mut |record| {
            out.push(record);
            true
        })
        .await?;
        Ok(out)
    }

    /// Hand records to `visit` one at a time; stops fetching as soon as it returns `false`.
    /// Returns the number of records visited.
    ///
    /// When several columns share a label, the record holds the last one.
    ///
    /// # Errors
    /// Returns cursor fetch errors and large-object read errors.
    pub async fn build_each(
        &self,
        cursor: &mut dyn ResultCursor,
        visit: &mut (dyn FnMut(Record) -> bool + Send),
    ) -> Result<usize> {
        let columns: Vec<ColumnInfo> = cursor.columns().to_vec();
        let all_labels: Vec<String> = columns
            .iter()
            .map(|c| self.column_case.apply(&c.label))
            .collect();
        // A repeated label (`a.id, b.id`) keeps only its last column, as a map insert would.
        let keep: Vec<bool> = all_labels
            .iter()
            .enumerate()
            .map(|(idx, label)| !all_labels[idx + 1..].contains(label))
            .collect();
        let labels: Arc<[String]> = all_labels
            .into_iter()
            .zip(&keep)
            .filter_map(|(label, kept)| kept.then_some(label))
            .collect();

        let mut visited = 0;
        while let Some(raw_row) = cursor.next_row().await? {
            let mut values = Vec::with_capacity(labels.len());
            for ((raw, column), kept) in raw_row.into_iter().zip(&columns).zip(&keep) {
                if *kept {
                    values.push(decode(raw, column)?);
                }
            }
            let record = Record::from_columns(labels.to_vec(), values)?;
            visited += 1;
            if !visit(record) {
                break;
            }
        }
        Ok(visited)
    }
}

/// Decode one cell according to the column's reported type.
///
/// # Errors
/// Returns `SqlRecordError::ExecutionError` when a large object cannot be read.
pub fn decode(raw: RawValue, column: &ColumnInfo) -> Result<Value> {
    let value = match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(v) if column.sql_type == SqlType::Boolean => Value::Bool(v != 0),
        RawValue::Long(v) if column.sql_type == SqlType::Boolean => Value::Bool(v != 0),
        RawValue::Int(v) => Value::Int(v),
        RawValue::Long(v) => Value::Long(v),
        RawValue::Float(v) => Value::Float(v),
        RawValue::Decimal(v) => Value::Decimal(v),
        RawValue::Text(s) => decode_text(s, column),
        RawValue::Bytes(b) => Value::Bytes(b),
        RawValue::Date(d) => Value::Date(d),
        RawValue::Time(t) => Value::Time(t),
        RawValue::Timestamp(ts) => Value::Timestamp(ts),
        RawValue::Json(j) => Value::Json(j),
        RawValue::Clob(mut reader) => {
            let mut buf = String::new();
            reader
                .read_to_string(&mut buf)
                .map_err(|e| lob_error(column, &e))?;
            Value::Text(buf)
        }
        RawValue::Blob(mut reader) => {
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .map_err(|e| lob_error(column, &e))?;
            Value::Bytes(buf)
        }
        RawValue::Other { type_name, value } => match value {
            None => Value::Null,
            Some(text) if is_json_type(&type_name) => match serde_json::from_str(&text) {
                Ok(json) => Value::Json(json),
                Err(e) => {
                    tracing::warn!(
                        column = %column.label,
                        error = %e,
                        "Column declared as JSON holds invalid JSON; keeping raw text"
                    );
                    Value::Text(text)
                }
            },
            Some(text) => Value::Text(text),
        },
        RawValue::Array(items) => {
            let element = ColumnInfo::new(column.label.clone(), SqlType::Unknown, "");
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(decode(item, &element)?);
            }
            Value::Array(list)
        }
    };
    Ok(value)
}

fn is_json_type(type_name: &str) -> bool {
    type_name.eq_ignore_ascii_case("json") || type_name.eq_ignore_ascii_case("jsonb")
}

/// Drivers that report temporal or JSON columns as text (SQLite) get typed values back
/// when the declared type says so and the text parses. Anything else stays text.
fn decode_text(s: String, column: &ColumnInfo) -> Value {
    match &column.sql_type {
        SqlType::Timestamp => parse_timestamp(&s).map_or(Value::Text(s), Value::Timestamp),
        SqlType::Date => NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_or(Value::Text(s), Value::Date),
        SqlType::Time => NaiveTime::parse_from_str(&s, "%H:%M:%S%.f").map_or(Value::Text(s), Value::Time),
        SqlType::Json => serde_json::from_str(&s).map_or(Value::Text(s), Value::Json),
        SqlType::Other(sub) if is_json_type(sub) => {
            serde_json::from_str(&s).map_or(Value::Text(s), Value::Json)
        }
        _ => Value::Text(s),
    }
}

fn lob_error(column: &ColumnInfo, e: &std::io::Error) -> SqlRecordError {
    SqlRecordError::ExecutionError(format!(
        "failed to read large object in column {}: {e}",
        column.label
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::cursor::VecCursor;

    fn cols() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("ID", SqlType::BigInt, "int8"),
            ColumnInfo::new("Doc", SqlType::Other("jsonb".into()), "jsonb"),
            ColumnInfo::new("Body", SqlType::Clob, "clob"),
            ColumnInfo::new("Tags", SqlType::Array, "_text"),
            ColumnInfo::new("Addr", SqlType::Other("inet".into()), "inet"),
        ]
    }

    fn row(id: i64) -> Vec<RawValue> {
        vec![
            RawValue::Long(id),
            RawValue::Other {
                type_name: "jsonb".into(),
                value: Some(r#"{"a":[1,2]}"#.into()),
            },
            RawValue::Clob(Box::new(Cursor::new(b"large text".to_vec()))),
            RawValue::Array(vec![RawValue::Text("x".into()), RawValue::Null]),
            RawValue::Other {
                type_name: "inet".into(),
                value: Some("10.0.0.1".into()),
            },
        ]
    }

    #[tokio::test]
    async fn decodes_vendor_types_and_lobs() {
        let mut cursor = VecCursor::new(cols(), vec![row(1)]);
        let records = RecordBuilder::default().build(&mut cursor).await.unwrap();
        let r = &records[0];
        assert_eq!(r.get_long("ID"), Some(1));
        assert_eq!(r.get_json("Doc"), Some(&serde_json::json!({"a": [1, 2]})));
        assert_eq!(r.get_str("Body"), Some("large text"));
        assert_eq!(
            r.get_array("Tags"),
            Some(&[Value::Text("x".into()), Value::Null][..])
        );
        assert_eq!(r.get_str("Addr"), Some("10.0.0.1"));
        assert!(r.modified_keys().is_empty());
    }

    #[tokio::test]
    async fn applies_column_case() {
        let mut cursor = VecCursor::new(cols(), vec![row(1)]);
        let records = RecordBuilder::new(ColumnCase::Lower).build(&mut cursor).await.unwrap();
        assert_eq!(records[0].column_names()[0], "id");
    }

    #[tokio::test]
    async fn build_each_stops_without_draining_cursor() {
        let mut cursor = VecCursor::new(cols(), (1..=5).map(row).collect());
        let mut seen = Vec::new();
        let visited = RecordBuilder::default()
            .build_each(&mut cursor, &mut |r| {
                seen.push(r.get_long("ID").unwrap_or_default());
                seen.len() < 2
            })
            .await
            .unwrap();
        assert_eq!(visited, 2);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(cursor.remaining(), 3);
    }

    #[tokio::test]
    async fn textual_temporal_and_boolean_columns_are_typed() {
        let columns = vec![
            ColumnInfo::new("created", SqlType::Timestamp, "TIMESTAMP"),
            ColumnInfo::new("active", SqlType::Boolean, "BOOLEAN"),
            ColumnInfo::new("note", SqlType::Timestamp, "TIMESTAMP"),
        ];
        let mut cursor = VecCursor::new(
            columns,
            vec![vec![
                RawValue::Text("2024-01-02 03:04:05".into()),
                RawValue::Long(1),
                RawValue::Text("not a date".into()),
            ]],
        );
        let records = RecordBuilder::default().build(&mut cursor).await.unwrap();
        assert!(matches!(records[0].get("created"), Some(Value::Timestamp(_))));
        assert_eq!(records[0].get_bool("active"), Some(true));
        assert_eq!(records[0].get_str("note"), Some("not a date"));
    }

    #[tokio::test]
    async fn repeated_labels_keep_the_last_column() {
        let columns = vec![
            ColumnInfo::new("id", SqlType::BigInt, "int8"),
            ColumnInfo::new("name", SqlType::Varchar, "text"),
            ColumnInfo::new("id", SqlType::BigInt, "int8"),
        ];
        let mut cursor = VecCursor::new(
            columns,
            vec![vec![RawValue::Long(1), RawValue::Text("a".into()), RawValue::Long(2)]],
        );
        let records = RecordBuilder::default().build(&mut cursor).await.unwrap();
        assert_eq!(records[0].column_names(), ["name", "id"]);
        assert_eq!(records[0].get_long("id"), Some(2));
    }
}
