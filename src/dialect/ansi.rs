use super::{BindCapabilities, Dialect};

/// Portable fallback for databases without a windowing clause. Pagination walks the
/// cursor of the unbounded query instead of rewriting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiDialect;

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn bind_capabilities(&self) -> BindCapabilities {
        BindCapabilities::TEXTUAL
    }

    fn for_paginate(&self, _page_number: u64, _page_size: u64, find_sql: &str) -> String {
        find_sql.to_string()
    }

    fn takes_over_paginate(&self) -> bool {
        true
    }
}
