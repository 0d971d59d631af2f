//! The fetch loop: runs one request on the worker and streams its rows into a table.

use super::event::millis;
use super::{EventKind, ExecutionEvent, ExecutionRequest, ExecutionResponse, RunningTasks};
use crate::config::EngineConfig;
use crate::db::{RowCursor, StatementOutcome};
use crate::error::PagerError;
use crate::store::Table;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A request queued for the worker.
pub(crate) struct Job {
    pub request: Arc<ExecutionRequest>,
    pub events: mpsc::UnboundedSender<ExecutionEvent>,
    pub cancel: CancellationToken,
}

/// Decides when row counts are worth a progress event.
///
/// The threshold starts at `start` and doubles every time it is hit, up to `max`,
/// so huge results produce logarithmically spaced events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSchedule {
    size: usize,
    max: usize,
}

impl BatchSchedule {
    pub fn new(start: usize, max: usize) -> Self {
        let start = start.max(1);
        Self {
            size: start,
            max: max.max(start),
        }
    }

    /// Current threshold.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns true if a progress event is due at `rows`, growing the threshold.
    pub fn is_due(&mut self, rows: usize) -> bool {
        if rows == 0 || rows % self.size != 0 {
            return false;
        }
        self.size = self.size.saturating_mul(2).min(self.max);
        true
    }
}

impl From<&EngineConfig> for BatchSchedule {
    fn from(engine: &EngineConfig) -> Self {
        Self::new(engine.start_batch_size, engine.max_batch_size)
    }
}

/// State of one execution while it runs.
struct FetchLoop<'a> {
    job: &'a Job,
    running: &'a RunningTasks,
    response: ExecutionResponse,
    started: Instant,
    fetch_started: Option<Instant>,
}

impl<'a> FetchLoop<'a> {
    fn new(job: &'a Job, running: &'a RunningTasks) -> Self {
        let table = Arc::new(Table::new(job.request.id()));
        Self {
            job,
            running,
            response: ExecutionResponse::new(Arc::clone(&job.request), table),
            started: Instant::now(),
            fetch_started: None,
        }
    }

    fn table(&self) -> &Table {
        &self.response.table
    }

    fn stamp(&mut self) {
        let now = Instant::now();
        self.response.rows = self.response.table.size();
        self.response.total_ms = millis(now - self.started);
        if let Some(fetch_started) = self.fetch_started {
            self.response.fetch_ms = millis(now - fetch_started);
        }
    }

    fn emit(&mut self, kind: EventKind) {
        self.stamp();
        let event = ExecutionEvent {
            kind,
            response: self.response.clone(),
        };
        if self.job.events.send(event).is_err() {
            debug!(
                "Dropped {} event for [{}]: listener is gone",
                kind,
                self.job.request.id()
            );
        }
    }

    fn release(&self) {
        let request = &self.job.request;
        self.running.release(request.source_key(), request.id());
    }

    fn fail(&mut self, error: PagerError) {
        self.release();
        let request = &self.job.request;
        error!(
            "Failed [{}] from [{}]: {}",
            request.id(),
            request.source_key(),
            error
        );
        self.response.error = Some(error);
        self.emit(EventKind::Failure);
    }

    fn cancelled(&mut self) {
        self.release();
        let request = &self.job.request;
        info!(
            "Cancelled [{}] from [{}] after {} rows",
            request.id(),
            request.source_key(),
            self.table().size()
        );
        self.emit(EventKind::Cancelled);
    }

    fn completed(&mut self) {
        self.release();
        self.stamp();
        let request = &self.job.request;
        info!(
            "COMPLETED [{}] {} rows, {} ms (exec:{}, fetch:{})",
            request.id(),
            self.table().size(),
            self.response.total_ms,
            self.response.exec_ms,
            self.response.fetch_ms
        );
        self.emit(EventKind::Completed);
    }

    async fn run(mut self, engine: &EngineConfig) {
        let request = Arc::clone(&self.job.request);
        let cancel = self.job.cancel.clone();
        let conn = Arc::clone(request.connection());

        if cancel.is_cancelled() {
            self.cancelled();
            return;
        }

        let valid = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            valid = conn.is_valid() => Some(valid),
        };
        match valid {
            None => return self.cancelled(),
            Some(false) => {
                return self.fail(PagerError::connection(format!(
                    "Connection [{}] is not valid",
                    conn.id()
                )));
            }
            Some(true) => {}
        }

        info!(
            "Executing [{}] from [{}] over [{}]: {}",
            request.id(),
            request.source_key(),
            conn.id(),
            request.sql()
        );
        self.emit(EventKind::Started);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = conn.execute(request.sql(), engine.query_timeout()) => Some(outcome),
        };
        let fetch_started = Instant::now();
        self.response.exec_ms = millis(fetch_started - self.started);
        self.fetch_started = Some(fetch_started);

        match outcome {
            None => self.cancelled(),
            Some(Err(e)) => self.fail(e),
            Some(Ok(StatementOutcome::UpdateCount(count))) => {
                self.response.update_count = Some(count);
                self.completed();
            }
            Some(Ok(StatementOutcome::ResultSet(mut cursor))) => {
                let result = self.fetch_rows(cursor.as_mut(), &cancel, engine).await;
                cursor.close().await;
                match result {
                    FetchEnd::Exhausted => self.completed(),
                    FetchEnd::Cancelled => self.cancelled(),
                    FetchEnd::Failed(e) => self.fail(e),
                }
            }
        }
    }

    async fn fetch_rows(
        &mut self,
        cursor: &mut dyn RowCursor,
        cancel: &CancellationToken,
        engine: &EngineConfig,
    ) -> FetchEnd {
        let mut batch = BatchSchedule::from(engine);
        let mut row_idx = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return FetchEnd::Cancelled,
                next = cursor.next_row() => next,
            };
            let row = match next {
                Ok(Some(row)) => row,
                Ok(None) => return FetchEnd::Exhausted,
                Err(e) => return FetchEnd::Failed(e),
            };

            if !self.table().has_col_metadata() {
                self.table().set_col_metadata(row.as_ref());
            }
            if let Err(e) = self.table().add_row(row_idx, row.as_ref()) {
                return FetchEnd::Failed(e);
            }
            row_idx += 1;

            if batch.is_due(row_idx) {
                self.emit(EventKind::ResultsAvailable);
            }
        }
    }
}

enum FetchEnd {
    Exhausted,
    Cancelled,
    Failed(PagerError),
}

/// Runs `job` to its terminal event.
pub(crate) async fn execute_request(job: Job, running: &RunningTasks, engine: &EngineConfig) {
    FetchLoop::new(&job, running).run(engine).await;
}
