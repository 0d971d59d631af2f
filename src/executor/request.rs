//! Execution requests.

use crate::db::Connection;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Unique identifier for a request, shared by the table it fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Generates a new unique request ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the inner u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A query to run on behalf of a source.
///
/// The source key identifies the logical caller (an editor tab, a CLI session).
/// At most one execution per source key is live at any time.
pub struct ExecutionRequest {
    id: RequestId,
    source_key: String,
    connection: Arc<dyn Connection>,
    sql: String,
    created_at: SystemTime,
}

impl ExecutionRequest {
    pub fn new(
        source_key: impl Into<String>,
        connection: Arc<dyn Connection>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            source_key: source_key.into(),
            connection,
            sql: sql.into(),
            created_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("id", &self.id)
            .field("source_key", &self.source_key)
            .field("connection", &self.connection.id())
            .field("sql", &self.sql)
            .finish()
    }
}
