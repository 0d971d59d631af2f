//! Shared helpers for integration tests.

use db_pager::config::EngineConfig;
use db_pager::db::Connection;
use db_pager::executor::{EventKind, ExecutionDispatcher, ExecutionEvent, ExecutionRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub type Events = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Starts a dispatcher with the given engine settings.
pub fn started(engine: EngineConfig) -> ExecutionDispatcher {
    let dispatcher = ExecutionDispatcher::new(engine);
    dispatcher.start().unwrap();
    dispatcher
}

/// Submits `sql` under `key` and returns the request with its event stream.
pub fn submit(
    dispatcher: &ExecutionDispatcher,
    key: &str,
    conn: Arc<dyn Connection>,
    sql: &str,
) -> (Arc<ExecutionRequest>, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    let request = dispatcher
        .submit(ExecutionRequest::new(key, conn, sql), tx)
        .unwrap();
    (request, rx)
}

/// Waits for the next event, failing the test after a few seconds.
pub async fn next_event(rx: &mut Events) -> ExecutionEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collects events up to and including the terminal one.
pub async fn until_terminal(rx: &mut Events) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = event.is_terminal();
        events.push(event);
        if done {
            return events;
        }
    }
}

pub fn kinds(events: &[ExecutionEvent]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}
