//! Append-only, column-typed result table.

use super::Row;
use crate::db::{ColumnInfo, ColumnType, RowSource, Value};
use crate::error::{PagerError, Result};
use crate::executor::RequestId;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};

/// Rows sampled when sizing a text column.
const WIDTH_SAMPLE_ROWS: usize = 20;

/// Pixels per character when sizing a text column.
const WIDTH_PER_CHAR: usize = 15;

/// Upper bound for a text column's content width.
const MAX_TEXT_WIDTH: usize = 620;

/// Pixels per character of the column header.
const HEADER_WIDTH_PER_CHAR: usize = 20;

/// The result set of one query execution.
///
/// Written by the executor's worker and read concurrently by the caller. Column
/// metadata is captured once, from the first fetched row; rows are only ever
/// appended, at consecutive indices.
pub struct Table {
    id: RequestId,
    columns: OnceLock<Vec<ColumnInfo>>,
    rows: RwLock<Vec<Row>>,
    size: AtomicUsize,
    closed: AtomicBool,
}

impl Table {
    /// Creates an empty table for the given request.
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            columns: OnceLock::new(),
            rows: RwLock::new(Vec::new()),
            size: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The id of the request that produced this table.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Captures column names and types from `source`.
    ///
    /// Returns false, leaving the metadata untouched, if it was already set.
    pub fn set_col_metadata(&self, source: &dyn RowSource) -> bool {
        self.columns.set(source.columns()).is_ok()
    }

    /// Returns true once column metadata has been captured.
    pub fn has_col_metadata(&self) -> bool {
        self.columns.get().is_some()
    }

    /// Materializes the cells of `source` and appends them as row `index`.
    ///
    /// `index` must equal the current size.
    pub fn add_row(&self, index: usize, source: &dyn RowSource) -> Result<()> {
        if self.is_closed() {
            return Err(PagerError::illegal_state(format!(
                "table {} is closed",
                self.id
            )));
        }
        let columns = self.columns.get().ok_or_else(|| {
            PagerError::illegal_state(format!("table {} has no column metadata", self.id))
        })?;

        let values: Vec<Value> = columns
            .iter()
            .enumerate()
            .map(|(col, info)| source.value(col, &info.column_type))
            .collect();

        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if index != rows.len() {
            return Err(PagerError::illegal_state(format!(
                "row index {index} out of order in table {}, expected {}",
                self.id,
                rows.len()
            )));
        }
        rows.push(Row::new(index, values));
        self.size.store(rows.len(), Ordering::Release);
        Ok(())
    }

    /// Current row count.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Returns true if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Cell value, or `None` when either index is out of range.
    pub fn value_at(&self, row: usize, col: usize) -> Option<Value> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.get(row).and_then(|r| r.value(col)).cloned()
    }

    /// A copy of the row at `index`.
    pub fn row(&self, index: usize) -> Option<Row> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.get(index).cloned()
    }

    /// Column metadata, empty until the first row is fetched.
    pub fn columns(&self) -> &[ColumnInfo] {
        self.columns.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn column_count(&self) -> usize {
        self.columns().len()
    }

    pub fn column_name(&self, col: usize) -> Option<&str> {
        self.columns().get(col).map(|c| c.name.as_str())
    }

    pub fn column_type(&self, col: usize) -> Option<&ColumnType> {
        self.columns().get(col).map(|c| &c.column_type)
    }

    /// Header label of a column: `name [TYPE]`.
    pub fn column_label(&self, col: usize) -> Option<String> {
        self.columns().get(col).map(ColumnInfo::label)
    }

    /// Display width hint for a column, in pixels.
    ///
    /// Text columns are sized from the first rows' content; the header always fits.
    pub fn column_width(&self, col: usize) -> Option<usize> {
        let info = self.columns().get(col)?;
        let content = match info.column_type.display_width() {
            Some(width) => width,
            None => {
                let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
                rows.iter()
                    .take(WIDTH_SAMPLE_ROWS)
                    .filter_map(|r| r.value(col))
                    .filter(|v| !v.is_null())
                    .map(|v| WIDTH_PER_CHAR * v.to_display_string().chars().count())
                    .max()
                    .unwrap_or(0)
                    .min(MAX_TEXT_WIDTH)
            }
        };
        let header = HEADER_WIDTH_PER_CHAR
            * (info.name.chars().count() + info.column_type.display_name().len());
        Some(content.max(header))
    }

    /// Releases the rows; the table accepts no further appends.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.iter_mut().for_each(Row::clear);
        rows.clear();
        rows.shrink_to_fit();
        self.size.store(0, Ordering::Release);
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("columns", &self.columns())
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}
