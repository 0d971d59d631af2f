//! Fixed-size page window over a [`Table`].
//!
//! The view never copies rows. It keeps the page boundaries of the table as it
//! was at the last [`PagedView::refresh`], so callers refresh on every progress
//! event and after every page change.

use crate::config::EngineConfig;
use crate::db::{ColumnType, Value};
use crate::store::Table;
use std::sync::Arc;

/// A read-only page window over a table.
#[derive(Debug)]
pub struct PagedView {
    table: Option<Arc<Table>>,
    page_size: usize,
    table_size: usize,
    current_page: usize,
    max_page: usize,
    page_start: usize,
    page_end: usize,
}

impl PagedView {
    /// Creates an empty view. A zero page size is treated as one.
    pub fn new(page_size: usize) -> Self {
        Self {
            table: None,
            page_size: page_size.max(1),
            table_size: 0,
            current_page: 0,
            max_page: 0,
            page_start: 0,
            page_end: 0,
        }
    }

    /// Shows page 0 of `table`.
    pub fn attach(&mut self, table: Arc<Table>) {
        self.table = Some(table);
        self.current_page = 0;
        self.refresh();
    }

    /// Drops the table and resets the window.
    pub fn detach(&mut self) -> Option<Arc<Table>> {
        let table = self.table.take();
        self.table_size = 0;
        self.current_page = 0;
        self.max_page = 0;
        self.page_start = 0;
        self.page_end = 0;
        table
    }

    pub fn table(&self) -> Option<&Arc<Table>> {
        self.table.as_ref()
    }

    /// Recomputes the page boundaries from the table's current size.
    pub fn refresh(&mut self) {
        let size = self.table.as_ref().map_or(0, |t| t.size());
        let p = self.page_size;

        self.table_size = size;
        self.max_page = size.div_ceil(p).saturating_sub(1);
        // A table only shrinks when closed; never leave the window past its end.
        self.current_page = self.current_page.min(self.max_page);
        self.page_start = self.current_page.saturating_mul(p).min(size);
        self.page_end = self.page_start + (size - self.page_start).min(p);
    }

    /// Moves to the next page, if there is one.
    pub fn next_page(&mut self) {
        if self.current_page < self.max_page {
            self.current_page += 1;
        }
        self.refresh();
    }

    /// Moves to the previous page, if there is one.
    pub fn prev_page(&mut self) {
        if self.current_page > 0 {
            self.current_page -= 1;
        }
        self.refresh();
    }

    pub fn can_next_page(&self) -> bool {
        self.current_page < self.max_page
    }

    pub fn can_prev_page(&self) -> bool {
        self.current_page > 0
    }

    /// Value at `row` (relative to the page) and `col`.
    ///
    /// Returns `None` when no table is attached or the cell lies outside the page.
    pub fn value_at(&self, row: usize, col: usize) -> Option<Value> {
        if row >= self.row_count_in_page() {
            return None;
        }
        self.table.as_ref()?.value_at(self.page_start + row, col)
    }

    pub fn row_count_in_page(&self) -> usize {
        self.page_end - self.page_start
    }

    /// Table size at the last refresh.
    pub fn table_size(&self) -> usize {
        self.table_size
    }

    pub fn column_count(&self) -> usize {
        self.table.as_ref().map_or(0, |t| t.column_count())
    }

    /// Header label, `name [TYPE]`.
    pub fn column_label(&self, col: usize) -> Option<String> {
        self.table.as_ref()?.column_label(col)
    }

    pub fn column_name(&self, col: usize) -> Option<&str> {
        self.table.as_ref()?.column_name(col)
    }

    /// Column type, `Varchar` when unknown.
    pub fn column_type(&self, col: usize) -> ColumnType {
        self.table
            .as_ref()
            .and_then(|t| t.column_type(col).cloned())
            .unwrap_or(ColumnType::Varchar)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn max_page(&self) -> usize {
        self.max_page
    }

    pub fn page_start(&self) -> usize {
        self.page_start
    }

    pub fn page_end(&self) -> usize {
        self.page_end
    }
}

impl Default for PagedView {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PagedView {
    fn from(engine: &EngineConfig) -> Self {
        Self::new(engine.page_size)
    }
}
