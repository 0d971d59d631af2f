//! Mock database connection for testing.
//!
//! Serves scripted rows from memory, with knobs for latency, mid-stream
//! failures and lost connections.

use super::{ColumnInfo, ColumnType, Connection, RowCursor, RowSource, StatementOutcome, Value};
use crate::error::{PagerError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock connection that returns predefined rows.
pub struct MockConnection {
    id: String,
    columns: Arc<Vec<ColumnInfo>>,
    rows: Arc<Vec<Vec<Value>>>,
    valid: AtomicBool,
    update_count: Option<u64>,
    fail_on_execute: Option<String>,
    fail_after: Option<(usize, String)>,
    execute_delay: Duration,
    row_delay: Duration,
    executions: AtomicUsize,
    last_sql: Mutex<Option<String>>,
}

impl MockConnection {
    /// Creates a mock connection serving the given columns and rows.
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            id: "mock".to_string(),
            columns: Arc::new(columns),
            rows: Arc::new(rows),
            valid: AtomicBool::new(true),
            update_count: None,
            fail_on_execute: None,
            fail_after: None,
            execute_delay: Duration::ZERO,
            row_delay: Duration::ZERO,
            executions: AtomicUsize::new(0),
            last_sql: Mutex::new(None),
        }
    }

    /// Creates a mock connection serving `count` rows of `(id BIGINT, name VARCHAR)`.
    pub fn with_generated_rows(count: usize) -> Self {
        let columns = vec![
            ColumnInfo::new("id", ColumnType::BigInt),
            ColumnInfo::new("name", ColumnType::Varchar),
        ];
        let rows = (0..count)
            .map(|i| vec![Value::Int(i as i64), Value::String(format!("row-{i}"))])
            .collect();
        Self::new(columns, rows)
    }

    /// Creates a mock connection for statements that return no rows.
    pub fn with_update_count(count: u64) -> Self {
        let mut conn = Self::new(Vec::new(), Vec::new());
        conn.update_count = Some(count);
        conn
    }

    /// Sets the identifier reported by `id()`.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Makes `execute` fail with the given database message.
    pub fn failing_on_execute(mut self, message: impl Into<String>) -> Self {
        self.fail_on_execute = Some(message.into());
        self
    }

    /// Makes the cursor fail after yielding `rows` rows.
    pub fn failing_after(mut self, rows: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((rows, message.into()));
        self
    }

    /// Delays the first result of every execution.
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = delay;
        self
    }

    /// Delays every row fetch.
    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = delay;
        self
    }

    /// Simulates a lost connection.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    /// Number of statements executed so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// The most recently executed statement.
    pub fn last_sql(&self) -> Option<String> {
        self.last_sql
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    async fn execute(&self, sql: &str, timeout: Duration) -> Result<StatementOutcome> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        *self
            .last_sql
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sql.to_string());

        if self.execute_delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(PagerError::query(format!(
                "canceling statement due to statement timeout ({} ms)",
                timeout.as_millis()
            )));
        }
        if !self.execute_delay.is_zero() {
            tokio::time::sleep(self.execute_delay).await;
        }

        if let Some(message) = &self.fail_on_execute {
            return Err(PagerError::query(message.clone()));
        }
        if let Some(count) = self.update_count {
            return Ok(StatementOutcome::UpdateCount(count));
        }

        Ok(StatementOutcome::ResultSet(Box::new(MockCursor {
            columns: Arc::clone(&self.columns),
            rows: Arc::clone(&self.rows),
            position: 0,
            fail_after: self.fail_after.clone(),
            row_delay: self.row_delay,
            closed: false,
        })))
    }

    async fn close(&self) -> Result<()> {
        self.invalidate();
        Ok(())
    }
}

struct MockCursor {
    columns: Arc<Vec<ColumnInfo>>,
    rows: Arc<Vec<Vec<Value>>>,
    position: usize,
    fail_after: Option<(usize, String)>,
    row_delay: Duration,
    closed: bool,
}

#[async_trait]
impl RowCursor for MockCursor {
    async fn next_row(&mut self) -> Result<Option<Box<dyn RowSource>>> {
        if self.closed {
            return Ok(None);
        }
        if !self.row_delay.is_zero() {
            tokio::time::sleep(self.row_delay).await;
        }
        if let Some((limit, message)) = &self.fail_after {
            if self.position >= *limit {
                return Err(PagerError::query(message.clone()));
            }
        }
        let Some(values) = self.rows.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        Ok(Some(Box::new(MockRow {
            columns: Arc::clone(&self.columns),
            values: values.clone(),
        })))
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// A row served by [`MockConnection`].
pub struct MockRow {
    columns: Arc<Vec<ColumnInfo>>,
    values: Vec<Value>,
}

impl MockRow {
    /// Creates a standalone row, mainly for store tests.
    pub fn new(columns: Vec<ColumnInfo>, values: Vec<Value>) -> Self {
        Self {
            columns: Arc::new(columns),
            values,
        }
    }
}

impl RowSource for MockRow {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> String {
        self.columns
            .get(index)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn column_type_name(&self, index: usize) -> String {
        self.columns
            .get(index)
            .map(|c| c.column_type.display_name().to_string())
            .unwrap_or_default()
    }

    fn value(&self, index: usize, _column_type: &ColumnType) -> Value {
        self.values.get(index).cloned().unwrap_or_default()
    }

    fn columns(&self) -> Vec<ColumnInfo> {
        self.columns.as_ref().clone()
    }
}
