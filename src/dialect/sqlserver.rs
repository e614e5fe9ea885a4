use super::{BindCapabilities, Dialect, common};

/// SQL Server: bracket quoting and OFFSET/FETCH paging. OFFSET requires an ORDER BY, so
/// unordered queries get a neutral one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote(&self, ident: &str) -> String {
        common::quote_with(ident, '[', ']')
    }

    fn bind_capabilities(&self) -> BindCapabilities {
        BindCapabilities::STANDARD
    }

    fn for_paginate(&self, page_number: u64, page_size: u64, find_sql: &str) -> String {
        let offset = common::page_offset(page_number, page_size);
        let order = if common::has_order_by(find_sql) {
            ""
        } else {
            " order by (select null)"
        };
        format!("{find_sql}{order} offset {offset} rows fetch next {page_size} rows only")
    }
}
