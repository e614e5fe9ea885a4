use std::error::Error;

use chrono::{DateTime, Utc};
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};
use tokio_util::bytes::{BufMut, BytesMut};

use crate::types::Value;

type BoxError = Box<dyn Error + Sync + Send>;

/// Binds a [`Value`] to whatever type the server inferred for the placeholder.
///
/// Integers are narrowed or widened to the parameter's width, decimals travel in the binary
/// NUMERIC format, and enum labels are sent as raw text.
#[derive(Debug)]
pub struct PgValue<'a>(pub &'a Value);

impl<'a> PgValue<'a> {
    /// Wrap a parameter slice for `tokio_postgres`.
    #[must_use]
    pub fn wrap(params: &'a [Value]) -> Vec<PgValue<'a>> {
        params.iter().map(PgValue).collect()
    }
}

/// Borrow wrapped values as the reference slice `tokio_postgres` expects.
#[must_use]
pub fn as_refs<'a>(values: &'a [PgValue<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

impl ToSql for PgValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => int_to_sql(i64::from(*i), ty, out),
            Value::Long(i) => int_to_sql(*i, ty, out),
            Value::Float(f) => float_to_sql(*f, ty, out),
            Value::Decimal(s) if *ty == Type::NUMERIC => numeric_to_sql(s, out),
            Value::Decimal(s) | Value::Text(s) | Value::Enum(s) => s.as_str().to_sql(ty, out),
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::Time(t) => t.to_sql(ty, out),
            Value::Timestamp(ts) if *ty == Type::TIMESTAMPTZ => {
                DateTime::<Utc>::from_naive_utc_and_offset(*ts, Utc).to_sql(ty, out)
            }
            Value::Timestamp(ts) => ts.to_sql(ty, out),
            Value::Json(json) => json.to_sql(ty, out),
            Value::Array(items) => {
                if !matches!(ty.kind(), Kind::Array(_)) {
                    return Err(format!("cannot bind an array to {ty}").into());
                }
                PgValue::wrap(items).to_sql(ty, out)
            }
        }
    }

    // Enum and domain types carry server-assigned OIDs, so the match happens in `to_sql`.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        #[allow(clippy::cast_precision_loss)]
        Type::FLOAT4 | Type::FLOAT8 => float_to_sql(v as f64, ty, out),
        Type::NUMERIC => numeric_to_sql(&v.to_string(), out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().as_str().to_sql(ty, out),
        _ => Err(format!("cannot bind an integer to {ty}").into()),
    }
}

fn float_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        #[allow(clippy::cast_possible_truncation)]
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::NUMERIC => numeric_to_sql(&v.to_string(), out),
        _ => v.to_sql(ty, out),
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;

/// Encode a plain decimal string (`-123.4500`) in the binary NUMERIC format: base-10000
/// digit groups with a weight, a sign and the display scale.
fn numeric_to_sql(text: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(format!("invalid decimal: {text}").into());
    }

    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let digits: String = "0".repeat(int_pad) + int_part + frac_part + &"0".repeat(frac_pad);
    let mut groups: Vec<i16> = digits
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0i16, |acc, b| acc * 10 + i16::from(b - b'0'))
        })
        .collect();

    let mut weight = i16::try_from((int_part.len() + int_pad) / 4)? - 1;
    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= i16::try_from(leading)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    let sign = if negative && !groups.is_empty() { NUMERIC_NEG } else { NUMERIC_POS };
    out.put_i16(i16::try_from(groups.len())?);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(u16::try_from(frac_part.len())?);
    for group in groups {
        out.put_i16(group);
    }
    Ok(IsNull::No)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(text: &str) -> Vec<u8> {
        let mut out = BytesMut::new();
        numeric_to_sql(text, &mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn numeric_groups_digits_in_base_10000() {
        // 12345.678 -> groups [1, 2345, 6780], weight 1, scale 3
        assert_eq!(
            numeric("12345.678"),
            vec![0, 3, 0, 1, 0, 0, 0, 3, 0, 1, 0x09, 0x29, 0x1a, 0x7c]
        );
    }

    #[test]
    fn numeric_sign_and_zero() {
        let negative = numeric("-0.5");
        assert_eq!(&negative[..8], &[0, 1, 0xff, 0xff, 0x40, 0x00, 0, 1]);
        assert_eq!(numeric("0.00"), vec![0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn integers_follow_the_parameter_width() {
        let mut out = BytesMut::new();
        PgValue(&Value::Long(7)).to_sql(&Type::INT2, &mut out).unwrap();
        assert_eq!(out.to_vec(), vec![0, 7]);

        let mut out = BytesMut::new();
        let err = PgValue(&Value::Long(i64::MAX)).to_sql(&Type::INT4, &mut out);
        assert!(err.is_err());
    }

    #[test]
    fn garbage_decimals_are_rejected() {
        let mut out = BytesMut::new();
        assert!(numeric_to_sql("12a", &mut out).is_err());
        assert!(numeric_to_sql(".", &mut out).is_err());
    }
}
