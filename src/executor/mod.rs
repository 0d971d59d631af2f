//! Asynchronous query execution.
//!
//! Requests are submitted to an [`ExecutionDispatcher`], run one at a time on a
//! background worker, and report their progress as [`ExecutionEvent`]s while
//! rows stream into a shared [`crate::store::Table`].

mod dispatcher;
mod event;
mod fetch;
mod request;
mod running;

pub use dispatcher::ExecutionDispatcher;
pub use event::{EventKind, ExecutionEvent, ExecutionResponse};
pub use fetch::BatchSchedule;
pub use request::{ExecutionRequest, RequestId};
pub use running::{RunningTask, RunningTasks};
