use super::{BindCapabilities, Dialect, GeneratedKeyPolicy, common};
use crate::record::Record;
use crate::sql_para::SqlPara;
use crate::types::Value;

/// Oracle: ROWNUM paging, sequences for keys and always reading generated keys back.
///
/// A primary-key value of the form `seq_name.nextval` is written into the INSERT text instead
/// of being bound:
/// ```rust
/// use sql_record::prelude::*;
///
/// let mut r = Record::new();
/// r.set("id", "user_seq.nextval").set("name", "a");
/// let para = OracleDialect.for_db_save("users", &["id".to_string()], &r);
/// assert_eq!(para.sql(), r#"insert into "users"("id", "name") values(user_seq.nextval, ?)"#);
/// assert_eq!(para.params(), &[Value::Text("a".into())]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

fn sequence_call<'a>(primary_key: &[String], column: &str, value: Option<&'a Value>) -> Option<&'a str> {
    let text = value?.as_str()?;
    let is_key = primary_key.iter().any(|k| k.eq_ignore_ascii_case(column));
    (is_key && text.to_ascii_lowercase().ends_with(".nextval")).then_some(text)
}

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn bind_capabilities(&self) -> BindCapabilities {
        BindCapabilities {
            booleans: false,
            ..BindCapabilities::STANDARD
        }
    }

    fn for_db_save(&self, table: &str, primary_key: &[String], record: &Record) -> SqlPara {
        let columns = common::insert_columns(primary_key, record);
        let mut names = Vec::with_capacity(columns.len());
        let mut marks = Vec::with_capacity(columns.len());
        let mut params = Vec::with_capacity(columns.len());
        for column in &columns {
            let value = record.get(column);
            names.push(self.quote(column));
            match sequence_call(primary_key, column, value) {
                Some(call) => marks.push(call.to_string()),
                None => {
                    marks.push("?".to_string());
                    params.push(value.cloned().unwrap_or(Value::Null));
                }
            }
        }
        let sql = format!(
            "insert into {}({}) values({})",
            self.quote(table),
            names.join(", "),
            marks.join(", ")
        );
        SqlPara::new(sql, params)
    }

    fn for_paginate(&self, page_number: u64, page_size: u64, find_sql: &str) -> String {
        let start = common::page_offset(page_number, page_size);
        let end = start.saturating_add(page_size);
        format!(
            "select * from ( select row_.*, rownum rownum_ from ( {find_sql} ) row_ \
             where rownum <= {end} ) table_alias where table_alias.rownum_ > {start}"
        )
    }

    fn generated_key_policy(&self) -> GeneratedKeyPolicy {
        GeneratedKeyPolicy::Always
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rownum_window() {
        assert_eq!(
            OracleDialect.for_paginate(2, 10, "select * from t"),
            "select * from ( select row_.*, rownum rownum_ from ( select * from t ) row_ \
             where rownum <= 20 ) table_alias where table_alias.rownum_ > 10"
        );
    }

    #[test]
    fn booleans_bind_as_numbers() {
        assert_eq!(
            OracleDialect.fill_statement(&[Value::Bool(false)]),
            vec![Value::Int(0)]
        );
    }
}
