//! Single-worker execution dispatcher.
//!
//! Accepts requests without blocking, runs them one at a time on a worker task,
//! and keeps at most one live execution per source key: a new submission from a
//! source cancels whatever that source still has running.

use super::fetch::{execute_request, Job};
use super::{ExecutionEvent, ExecutionRequest, RunningTask, RunningTasks};
use crate::config::EngineConfig;
use crate::error::{PagerError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const WORKER_NAME: &str = "sql-executor";

struct Worker {
    jobs: mpsc::UnboundedSender<Job>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs SQL requests on a single background worker.
pub struct ExecutionDispatcher {
    engine: EngineConfig,
    worker: Mutex<Option<Worker>>,
    running: RunningTasks,
}

impl ExecutionDispatcher {
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            engine,
            worker: Mutex::new(None),
            running: RunningTasks::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the worker on the current tokio runtime. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.lock();
        if worker.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            PagerError::illegal_state(format!("{WORKER_NAME} must start inside a tokio runtime"))
        })?;

        self.running.clear();
        let (jobs, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = runtime.spawn(run_worker(
            rx,
            shutdown.clone(),
            self.running.clone(),
            self.engine,
        ));
        *worker = Some(Worker {
            jobs,
            shutdown,
            handle,
        });
        info!("{WORKER_NAME} is running");
        Ok(())
    }

    /// Returns true between `start` and `close`.
    pub fn is_started(&self) -> bool {
        self.lock().is_some()
    }

    /// Schedules `request`, delivering its lifecycle events to `events`.
    ///
    /// Any execution still running for the same source key is cancelled first.
    /// Returns immediately with the shared request handle.
    pub fn submit(
        &self,
        request: impl Into<Arc<ExecutionRequest>>,
        events: mpsc::UnboundedSender<ExecutionEvent>,
    ) -> Result<Arc<ExecutionRequest>> {
        let worker = self.lock();
        let worker = worker
            .as_ref()
            .ok_or_else(|| PagerError::illegal_state("not started"))?;
        if events.is_closed() {
            return Err(PagerError::illegal_state("event listener cannot be closed"));
        }

        let request: Arc<ExecutionRequest> = request.into();
        let source_key = request.source_key();
        self.cancel_running(source_key);

        let cancel = worker.shutdown.child_token();
        self.running
            .insert(source_key, RunningTask::new(request.id(), cancel.clone()));
        let job = Job {
            request: Arc::clone(&request),
            events,
            cancel,
        };
        if worker.jobs.send(job).is_err() {
            self.running.release(source_key, request.id());
            return Err(PagerError::illegal_state(format!(
                "{WORKER_NAME} has stopped"
            )));
        }
        info!("Execution submitted [{}] from [{}]", request.id(), source_key);
        Ok(request)
    }

    /// Cancels the execution running for the request's source key, if any.
    ///
    /// Returns true if a running execution was asked to stop.
    pub fn cancel(&self, request: &ExecutionRequest) -> Result<bool> {
        self.cancel_source(request.source_key())
    }

    /// Cancels the execution running for `source_key`, if any.
    pub fn cancel_source(&self, source_key: &str) -> Result<bool> {
        let worker = self.lock();
        if worker.is_none() {
            return Err(PagerError::illegal_state("not started"));
        }
        Ok(self.cancel_running(source_key))
    }

    fn cancel_running(&self, source_key: &str) -> bool {
        match self.running.remove(source_key) {
            Some(task) if task.cancel() => {
                info!("Cancelling [{}] from [{}]", task.request_id, source_key);
                true
            }
            _ => false,
        }
    }

    /// Returns true if an execution is live for `source_key`.
    pub fn is_running(&self, source_key: &str) -> bool {
        self.running.contains(source_key)
    }

    /// Number of live executions.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Cancels every execution and stops the worker, waiting briefly for it to exit.
    /// Safe to call repeatedly.
    pub async fn close(&self) {
        let Some(worker) = self.stop() else {
            return;
        };
        let Worker { jobs, handle, .. } = worker;
        drop(jobs);

        let mut handle = handle;
        match tokio::time::timeout(self.engine.shutdown_timeout(), &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => warn!("{WORKER_NAME} ended abnormally: {e}"),
            Err(_) => {
                warn!(
                    "{WORKER_NAME} did not stop within {:?}, aborting",
                    self.engine.shutdown_timeout()
                );
                handle.abort();
            }
        }
        self.running.clear();
        info!("{WORKER_NAME} has finished");
    }

    /// Cancels everything and detaches the worker, without waiting.
    fn stop(&self) -> Option<Worker> {
        let worker = self.lock().take()?;
        for task in self.running.drain() {
            task.cancel();
        }
        worker.shutdown.cancel();
        Some(worker)
    }
}

impl Default for ExecutionDispatcher {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for ExecutionDispatcher {
    fn drop(&mut self) {
        if let Some(worker) = self.stop() {
            worker.handle.abort();
            debug!("{WORKER_NAME} dropped while running");
        }
    }
}

async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: CancellationToken,
    running: RunningTasks,
    engine: EngineConfig,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        execute_request(job, &running, &engine).await;
    }

    // Jobs still queued at shutdown end with CANCELLED without touching the database.
    jobs.close();
    while let Ok(job) = jobs.try_recv() {
        job.cancel.cancel();
        execute_request(job, &running, &engine).await;
    }
    debug!("{WORKER_NAME} loop exited");
}
