use super::{BindCapabilities, Dialect};

/// SQLite: LIMIT/OFFSET paging; booleans, temporal values, JSON and arrays bound as text or
/// integers since SQLite stores them that way.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn bind_capabilities(&self) -> BindCapabilities {
        BindCapabilities::TEXTUAL
    }
}
