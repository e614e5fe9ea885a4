//! Page windows over arbitrary find queries.

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::{Result, SqlRecordError};
use crate::executor::{each_on, query_on};
use crate::record::Record;
use crate::scope::{ConnectionScope, Route};
use crate::types::Value;

/// One page of results plus the totals it was cut from. `page_number` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    items: Vec<T>,
    page_number: u64,
    page_size: u64,
    total_pages: u64,
    total_rows: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, page_number: u64, page_size: u64, total_pages: u64, total_rows: u64) -> Self {
        Self {
            items,
            page_number,
            page_size,
            total_pages,
            total_rows,
        }
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    #[must_use]
    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    #[must_use]
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    #[must_use]
    pub fn is_first_page(&self) -> bool {
        self.page_number == 1
    }

    #[must_use]
    pub fn is_last_page(&self) -> bool {
        self.page_number >= self.total_pages
    }

    /// Convert the items, keeping the totals.
    ///
    /// # Errors
    /// Returns the first conversion error.
    pub fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<Page<U>> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_>>()?,
            page_number: self.page_number,
            page_size: self.page_size,
            total_pages: self.total_pages,
            total_rows: self.total_rows,
        })
    }
}

pub struct PaginationEngine<'a> {
    scope: &'a ConnectionScope,
}

impl<'a> PaginationEngine<'a> {
    #[must_use]
    pub fn new(scope: &'a ConnectionScope) -> Self {
        Self { scope }
    }

    /// Count with `total_row_sql`, then fetch page `page_number` of `find_sql`. Both queries
    /// take `params` and run on one connection.
    ///
    /// `group_by` says whether the count query is grouped. `None` infers it: more than one
    /// count row means one row per group.
    ///
    /// # Errors
    /// Returns `SqlRecordError::ConfigError` when `page_number` or `page_size` is zero, and
    /// statement errors from either query.
    pub async fn paginate(
        &self,
        page_number: u64,
        page_size: u64,
        group_by: Option<bool>,
        total_row_sql: &str,
        find_sql: &str,
        params: &[Value],
    ) -> Result<Page<Record>> {
        if page_number < 1 || page_size < 1 {
            return Err(SqlRecordError::ConfigError(format!(
                "page number and page size must be at least 1, got {page_number} and {page_size}"
            )));
        }
        let mut lease = self.scope.lease(Route::Read).await?;
        let outcome = self
            .paginate_on(lease.conn(), page_number, page_size, group_by, total_row_sql, find_sql, params)
            .await;
        lease.finish(outcome).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn paginate_on(
        &self,
        conn: &mut dyn Connection,
        page_number: u64,
        page_size: u64,
        group_by: Option<bool>,
        total_row_sql: &str,
        find_sql: &str,
        params: &[Value],
    ) -> Result<Page<Record>> {
        let counts = query_on(self.scope, conn, total_row_sql, params).await?;
        let total_rows = total_rows(&counts, group_by);
        if total_rows == 0 {
            return Ok(Page::new(Vec::new(), page_number, page_size, 0, 0));
        }
        let total_pages = total_rows.div_ceil(page_size);
        if page_number > total_pages {
            return Ok(Page::new(Vec::new(), page_number, page_size, total_pages, total_rows));
        }

        let dialect = self.scope.dialect();
        let items = if dialect.takes_over_paginate() {
            self.walk(conn, page_number, page_size, find_sql, params).await?
        } else {
            let sql = dialect.for_paginate(page_number, page_size, find_sql);
            query_on(self.scope, conn, &sql, params).await?
        };
        Ok(Page::new(items, page_number, page_size, total_pages, total_rows))
    }

    /// Skip to the page's first row on the cursor and read `page_size` rows.
    async fn walk(
        &self,
        conn: &mut dyn Connection,
        page_number: u64,
        page_size: u64,
        find_sql: &str,
        params: &[Value],
    ) -> Result<Vec<Record>> {
        let to_skip = (page_number - 1).saturating_mul(page_size);
        let take = usize::try_from(page_size).unwrap_or(usize::MAX);
        let mut skipped = 0u64;
        let mut items = Vec::new();
        each_on(self.scope, conn, find_sql, params, &mut |record: Record| {
            if skipped < to_skip {
                skipped += 1;
                return true;
            }
            items.push(record);
            items.len() < take
        })
        .await?;
        Ok(items)
    }
}

fn total_rows(counts: &[Record], group_by: Option<bool>) -> u64 {
    let grouped = group_by.unwrap_or(counts.len() > 1);
    if grouped {
        return u64::try_from(counts.len()).unwrap_or(u64::MAX);
    }
    counts
        .first()
        .and_then(|r| r.column_values().first())
        .and_then(Value::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}
