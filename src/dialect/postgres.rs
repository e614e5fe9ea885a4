use super::{BindCapabilities, Dialect};

/// PostgreSQL: double-quote identifiers, LIMIT/OFFSET paging, native arrays, JSON and enums.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn bind_capabilities(&self) -> BindCapabilities {
        BindCapabilities::NATIVE
    }
}
