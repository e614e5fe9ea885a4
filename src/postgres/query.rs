use std::error::Error;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Column, Row, RowStream};

use crate::cursor::{ColumnInfo, RawValue, ResultCursor};
use crate::error::Result;
use crate::types::SqlType;

type BoxError = Box<dyn Error + Sync + Send>;

/// Cursor over a live row stream. Rows are decoded as they arrive; dropping the cursor
/// abandons the rest of the result.
pub(crate) struct PgCursor {
    columns: Vec<ColumnInfo>,
    rows: Pin<Box<RowStream>>,
}

impl PgCursor {
    pub(crate) fn new(columns: &[Column], rows: RowStream) -> Self {
        Self {
            columns: columns.iter().map(describe).collect(),
            rows: Box::pin(rows),
        }
    }
}

#[async_trait]
impl ResultCursor for PgCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<RawValue>>> {
        let Some(row) = self.rows.try_next().await? else {
            return Ok(None);
        };
        let mut cells = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            cells.push(extract_value(&row, idx)?);
        }
        Ok(Some(cells))
    }
}

pub(crate) fn describe(column: &Column) -> ColumnInfo {
    let ty = column.type_();
    ColumnInfo::new(column.name(), sql_type(ty), ty.name())
}

fn sql_type(ty: &Type) -> SqlType {
    if matches!(ty.kind(), Kind::Array(_)) {
        return SqlType::Array;
    }
    match *ty {
        Type::BOOL => SqlType::Boolean,
        Type::INT2 => SqlType::SmallInt,
        Type::INT4 => SqlType::Integer,
        Type::INT8 | Type::OID => SqlType::BigInt,
        Type::NUMERIC => SqlType::Decimal,
        Type::FLOAT4 => SqlType::Float,
        Type::FLOAT8 => SqlType::Double,
        Type::BPCHAR => SqlType::Char,
        Type::VARCHAR | Type::TEXT | Type::NAME => SqlType::Varchar,
        Type::BYTEA => SqlType::Binary,
        Type::DATE => SqlType::Date,
        Type::TIME => SqlType::Time,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => SqlType::Timestamp,
        Type::JSON | Type::JSONB => SqlType::Json,
        _ => SqlType::Other(ty.name().to_string()),
    }
}

/// Extracts a `RawValue` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns the driver error if the column cannot be retrieved.
pub(crate) fn extract_value(row: &Row, idx: usize) -> Result<RawValue> {
    let ty = row.columns()[idx].type_();
    if let Kind::Array(member) = ty.kind() {
        return extract_array(row, idx, member);
    }
    let value = match *ty {
        Type::BOOL => get(row, idx, RawValue::Bool)?,
        Type::INT2 => get(row, idx, |v: i16| RawValue::Int(i32::from(v)))?,
        Type::INT4 => get(row, idx, RawValue::Int)?,
        Type::INT8 => get(row, idx, RawValue::Long)?,
        Type::OID => get(row, idx, |v: u32| RawValue::Long(i64::from(v)))?,
        Type::FLOAT4 => get(row, idx, |v: f32| RawValue::Float(f64::from(v)))?,
        Type::FLOAT8 => get(row, idx, RawValue::Float)?,
        Type::NUMERIC => get(row, idx, |v: PgNumeric| RawValue::Decimal(v.0))?,
        Type::BYTEA => get(row, idx, RawValue::Bytes)?,
        Type::DATE => get(row, idx, RawValue::Date)?,
        Type::TIME => get(row, idx, RawValue::Time)?,
        Type::TIMESTAMP => get(row, idx, RawValue::Timestamp)?,
        Type::TIMESTAMPTZ => {
            get(row, idx, |v: DateTime<Utc>| RawValue::Timestamp(v.naive_utc()))?
        }
        Type::JSON | Type::JSONB => get(row, idx, RawValue::Json)?,
        // Text types, enums and anything else with a text-compatible wire format.
        _ => get(row, idx, PgRaw::into_raw)?,
    };
    Ok(value)
}

fn get<'r, T, F>(row: &'r Row, idx: usize, f: F) -> Result<RawValue>
where
    T: FromSql<'r>,
    F: Fn(T) -> RawValue,
{
    let value: Option<T> = row.try_get(idx)?;
    Ok(value.map_or(RawValue::Null, f))
}

fn extract_array(row: &Row, idx: usize, member: &Type) -> Result<RawValue> {
    fn collect<'r, T, F>(row: &'r Row, idx: usize, f: F) -> Result<RawValue>
    where
        T: FromSql<'r>,
        F: Fn(T) -> RawValue,
    {
        let items: Option<Vec<Option<T>>> = row.try_get(idx)?;
        Ok(items.map_or(RawValue::Null, |items| {
            RawValue::Array(
                items
                    .into_iter()
                    .map(|item| item.map_or(RawValue::Null, &f))
                    .collect(),
            )
        }))
    }

    match *member {
        Type::BOOL => collect(row, idx, RawValue::Bool),
        Type::INT2 => collect(row, idx, |v: i16| RawValue::Int(i32::from(v))),
        Type::INT4 => collect(row, idx, RawValue::Int),
        Type::INT8 => collect(row, idx, RawValue::Long),
        Type::FLOAT4 => collect(row, idx, |v: f32| RawValue::Float(f64::from(v))),
        Type::FLOAT8 => collect(row, idx, RawValue::Float),
        Type::NUMERIC => collect(row, idx, |v: PgNumeric| RawValue::Decimal(v.0)),
        _ => collect(row, idx, PgRaw::into_raw),
    }
}

/// Undecoded wire bytes; text when they are valid UTF-8.
struct PgRaw(Vec<u8>);

impl PgRaw {
    fn into_raw(self) -> RawValue {
        match String::from_utf8(self.0) {
            Ok(text) => RawValue::Text(text),
            Err(e) => RawValue::Bytes(e.into_bytes()),
        }
    }
}

impl<'a> FromSql<'a> for PgRaw {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(PgRaw(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Binary NUMERIC rendered as a plain decimal string.
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_numeric(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let word = |i: usize| -> Result<[u8; 2], BoxError> {
        raw.get(i * 2..i * 2 + 2)
            .and_then(|b| <[u8; 2]>::try_from(b).ok())
            .ok_or_else(|| "truncated numeric".into())
    };
    let ndigits = usize::try_from(i16::from_be_bytes(word(0)?))?;
    let weight = i32::from(i16::from_be_bytes(word(1)?));
    let sign = u16::from_be_bytes(word(2)?);
    let scale = usize::from(u16::from_be_bytes(word(3)?));
    match sign {
        0x0000 | 0x4000 => {}
        0xC000 => return Ok("NaN".to_string()),
        other => return Err(format!("unsupported numeric sign {other:#x}").into()),
    }

    let mut groups = Vec::with_capacity(ndigits);
    for i in 0..ndigits {
        groups.push(i16::from_be_bytes(word(4 + i)?));
    }
    let group_at = |pos: i32| -> i16 {
        usize::try_from(weight - pos)
            .ok()
            .and_then(|i| groups.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        for pos in (0..=weight).rev() {
            let group = group_at(pos);
            if pos == weight {
                text.push_str(&group.to_string());
            } else {
                text.push_str(&format!("{group:04}"));
            }
        }
    }
    if scale > 0 {
        let mut frac = String::with_capacity(scale + 4);
        let mut pos = -1;
        while frac.len() < scale {
            frac.push_str(&format!("{:04}", group_at(pos)));
            pos -= 1;
        }
        frac.truncate(scale);
        text.push('.');
        text.push_str(&frac);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_decodes_to_plain_text() {
        let raw = [0, 3, 0, 1, 0, 0, 0, 3, 0, 1, 0x09, 0x29, 0x1a, 0x7c];
        assert_eq!(decode_numeric(&raw).unwrap(), "12345.678");
        let half = [0, 1, 0xff, 0xff, 0x40, 0x00, 0, 1, 0x13, 0x88];
        assert_eq!(decode_numeric(&half).unwrap(), "-0.5");
        assert_eq!(decode_numeric(&[0, 0, 0, 0, 0, 0, 0, 2]).unwrap(), "0.00");
    }

    #[test]
    fn truncated_numeric_is_an_error() {
        assert!(decode_numeric(&[0, 2, 0, 0]).is_err());
    }

    #[test]
    fn array_and_enum_types_map_to_sql_types() {
        assert_eq!(sql_type(&Type::INT4_ARRAY), SqlType::Array);
        assert_eq!(sql_type(&Type::TIMESTAMPTZ), SqlType::Timestamp);
        assert_eq!(sql_type(&Type::UUID), SqlType::Other("uuid".to_string()));
    }

    #[test]
    fn invalid_utf8_stays_binary() {
        assert!(matches!(PgRaw(vec![0xff, 0x00]).into_raw(), RawValue::Bytes(_)));
        assert!(matches!(PgRaw(b"happy".to_vec()).into_raw(), RawValue::Text(ref s) if s == "happy"));
    }
}
