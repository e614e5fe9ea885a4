use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SqlRecordError};
use crate::types::Value;

/// SQL text with its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlPara {
    sql: String,
    params: Vec<Value>,
}

impl SqlPara {
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    #[must_use]
    pub fn add_para(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

/// Resolves a symbolic key plus arguments into executable SQL. The template language is the
/// implementation's business.
pub trait SqlTemplates: Send + Sync {
    /// # Errors
    /// Returns an error when `key` is unknown or the arguments do not fit the template.
    fn resolve(&self, key: &str, args: &HashMap<String, Value>) -> Result<SqlPara>;
}

/// Fixed SQL per key; named arguments are bound in the order given at registration.
///
/// ```rust
/// use std::collections::HashMap;
/// use sql_record::prelude::*;
///
/// let templates = StaticTemplates::new()
///     .with("user.byName", "select * from users where name = ?", &["name"]);
/// let mut args = HashMap::new();
/// args.insert("name".to_string(), Value::from("alice"));
/// let para = templates.resolve("user.byName", &args).unwrap();
/// assert_eq!(para.params(), &[Value::from("alice")]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticTemplates {
    entries: HashMap<String, (String, Arc<[String]>)>,
}

impl StaticTemplates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, sql: &str, arg_order: &[&str]) -> Self {
        let order: Arc<[String]> = arg_order.iter().map(|s| (*s).to_string()).collect();
        self.entries
            .insert(key.to_string(), (sql.to_string(), order));
        self
    }
}

impl SqlTemplates for StaticTemplates {
    fn resolve(&self, key: &str, args: &HashMap<String, Value>) -> Result<SqlPara> {
        let (sql, order) = self
            .entries
            .get(key)
            .ok_or_else(|| SqlRecordError::ConfigError(format!("unknown sql template: {key}")))?;
        let params = order
            .iter()
            .map(|name| {
                args.get(name).cloned().ok_or_else(|| {
                    SqlRecordError::ParameterError(format!(
                        "sql template {key} needs argument {name}"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SqlPara::new(sql.clone(), params))
    }
}
