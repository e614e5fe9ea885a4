use super::{BindCapabilities, Dialect, common};

/// MySQL / MariaDB: backtick quoting, `limit offset, size` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, ident: &str) -> String {
        common::quote_with(ident, '`', '`')
    }

    fn bind_capabilities(&self) -> BindCapabilities {
        BindCapabilities::STANDARD
    }

    fn for_paginate(&self, page_number: u64, page_size: u64, find_sql: &str) -> String {
        let offset = common::page_offset(page_number, page_size);
        format!("{find_sql} limit {offset}, {page_size}")
    }
}
