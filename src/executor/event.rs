//! Lifecycle events pushed to the submitter of a request.

use super::ExecutionRequest;
use crate::error::PagerError;
use crate::store::Table;
use std::sync::Arc;
use std::time::Duration;

/// Stage of an execution reported by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The connection is valid and the statement is about to run.
    Started,
    /// Partial results have been collected.
    ResultsAvailable,
    /// All results have been collected.
    Completed,
    /// The execution was cancelled or superseded.
    Cancelled,
    /// The execution failed; rows fetched before the failure stay in the table.
    Failure,
}

impl EventKind {
    /// Returns true for the kinds that end an execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::ResultsAvailable => "RESULTS_AVAILABLE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an execution at the time an event fired.
#[derive(Debug, Clone)]
pub struct ExecutionResponse {
    /// The originating request.
    pub request: Arc<ExecutionRequest>,
    /// The table being filled. Shared with the worker until a terminal event.
    pub table: Arc<Table>,
    /// Rows in the table when the event fired.
    pub rows: usize,
    /// Time since the execution began.
    pub total_ms: u64,
    /// Time until the first result was available.
    pub exec_ms: u64,
    /// Time spent fetching rows.
    pub fetch_ms: u64,
    /// Rows affected, for statements that return no rows.
    pub update_count: Option<u64>,
    /// Set on failure.
    pub error: Option<PagerError>,
}

impl ExecutionResponse {
    pub(crate) fn new(request: Arc<ExecutionRequest>, table: Arc<Table>) -> Self {
        Self {
            request,
            table,
            rows: 0,
            total_ms: 0,
            exec_ms: 0,
            fetch_ms: 0,
            update_count: None,
            error: None,
        }
    }

    /// Rows in the table when the event fired.
    pub fn row_count(&self) -> usize {
        self.rows
    }
}

/// A lifecycle event for one request.
#[derive(Debug, Clone)]
pub struct ExecutionEvent {
    pub kind: EventKind,
    pub response: ExecutionResponse,
}

impl ExecutionEvent {
    pub fn id(&self) -> super::RequestId {
        self.response.request.id()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

/// Converts a duration to whole milliseconds.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
