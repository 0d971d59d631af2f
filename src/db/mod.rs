//! Database abstraction layer for db-pager.
//!
//! The engine never opens, pools or retries connections itself. It talks to an
//! already-open connection through the [`Connection`] capability set: a validity
//! check, statement execution with a timeout, and a row cursor.

mod mock;
mod postgres;
mod types;

pub use mock::{MockConnection, MockRow};
pub use postgres::{PostgresConnection, PostgresCursor};
pub use types::{ColumnInfo, ColumnType, Value};

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// An open database connection handle.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identifier used in logs and error messages.
    fn id(&self) -> &str;

    /// Returns true if the connection can still execute statements.
    async fn is_valid(&self) -> bool;

    /// Executes a statement, enforcing `timeout` on the database side.
    ///
    /// Resolves once the first result is available.
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<StatementOutcome>;

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}

/// What a statement produced.
pub enum StatementOutcome {
    /// A cursor over the returned rows.
    ResultSet(Box<dyn RowCursor>),
    /// Number of rows affected by a statement that returns no rows.
    UpdateCount(u64),
}

impl std::fmt::Debug for StatementOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResultSet(_) => f.write_str("ResultSet(..)"),
            Self::UpdateCount(n) => f.debug_tuple("UpdateCount").field(n).finish(),
        }
    }
}

/// A forward-only cursor over a statement's rows.
#[async_trait]
pub trait RowCursor: Send {
    /// Advances to the next row. Returns `None` once the rows are exhausted.
    async fn next_row(&mut self) -> Result<Option<Box<dyn RowSource>>>;

    /// Releases the cursor's resources. Further calls to `next_row` return `None`.
    async fn close(&mut self);
}

/// The row a cursor is positioned on.
pub trait RowSource: Send {
    /// Number of columns in the row.
    fn column_count(&self) -> usize;

    /// Name of the column at `index`.
    fn column_name(&self, index: usize) -> String;

    /// Database type name of the column at `index`.
    fn column_type_name(&self, index: usize) -> String;

    /// Decodes the cell at `index` as the given column type.
    fn value(&self, index: usize, column_type: &ColumnType) -> Value;

    /// Column metadata for every column of the row.
    fn columns(&self) -> Vec<ColumnInfo> {
        (0..self.column_count())
            .map(|i| {
                ColumnInfo::new(
                    self.column_name(i),
                    ColumnType::from_type_name(&self.column_type_name(i)),
                )
            })
            .collect()
    }
}
