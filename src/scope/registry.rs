use std::collections::HashMap;
use std::sync::Arc;

use super::ConnectionScope;
use crate::db::Db;
use crate::error::{Result, SqlRecordError};

/// Named databases owned by the application. The first scope added is the main one unless
/// another is chosen with [`DbRegistry::set_main`].
#[derive(Debug, Default, Clone)]
pub struct DbRegistry {
    scopes: HashMap<String, Db>,
    main: Option<String>,
}

impl DbRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scope under its name.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` if the name is already taken.
    pub fn add(&mut self, scope: Arc<ConnectionScope>) -> Result<Db> {
        let name = scope.name().to_string();
        if self.scopes.contains_key(&name) {
            return Err(SqlRecordError::ConfigError(format!(
                "database {name} is already registered"
            )));
        }
        let db = Db::new(scope);
        self.scopes.insert(name.clone(), db.clone());
        self.main.get_or_insert(name);
        Ok(db)
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for an unknown name.
    pub fn set_main(&mut self, name: &str) -> Result<()> {
        if !self.scopes.contains_key(name) {
            return Err(unknown(name));
        }
        self.main = Some(name.to_string());
        Ok(())
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when nothing is registered.
    pub fn main(&self) -> Result<Db> {
        let name = self.main.as_deref().ok_or_else(|| {
            SqlRecordError::ConfigError("no database has been registered".to_string())
        })?;
        self.get(name)
    }

    /// # Errors
    /// Returns `SqlRecordError::ConfigError` for an unknown name.
    pub fn get(&self, name: &str) -> Result<Db> {
        self.scopes.get(name).cloned().ok_or_else(|| unknown(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}

fn unknown(name: &str) -> SqlRecordError {
    SqlRecordError::ConfigError(format!("no database registered as {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockDataSource;
    use crate::types::DialectKind;

    fn scope(name: &str) -> Arc<ConnectionScope> {
        ConnectionScope::builder(name)
            .datasource(MockDataSource::new())
            .dialect_kind(DialectKind::Sqlite)
            .build()
            .unwrap()
    }

    #[test]
    fn first_scope_is_main_and_names_are_unique() {
        let mut registry = DbRegistry::new();
        registry.add(scope("main")).unwrap();
        registry.add(scope("reporting")).unwrap();
        assert!(registry.add(scope("main")).is_err());

        assert_eq!(registry.main().unwrap().scope().name(), "main");
        registry.set_main("reporting").unwrap();
        assert_eq!(registry.main().unwrap().scope().name(), "reporting");
        assert!(registry.get("missing").is_err());
        assert!(registry.set_main("missing").is_err());
    }
}
