//! Dispatcher integration tests over the mock connection.

use super::common::{kinds, next_event, started, submit, until_terminal};
use db_pager::config::EngineConfig;
use db_pager::db::{Connection, MockConnection};
use db_pager::error::PagerError;
use db_pager::executor::{EventKind, ExecutionRequest};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn slow_rows(count: usize) -> Arc<dyn Connection> {
    Arc::new(MockConnection::with_generated_rows(count).with_row_delay(Duration::from_millis(1)))
}

/// Scenario: A second submission from the same source supersedes the first
/// Given R1 is fetching rows for key "A"
/// When R2 is submitted for key "A" to the same listener
/// Then R1 ends with CANCELLED and never COMPLETED
/// And R1's CANCELLED is delivered before R2's STARTED
/// And R2 runs from STARTED to COMPLETED
#[tokio::test]
async fn test_same_key_submission_cancels_previous() {
    let dispatcher = started(EngineConfig::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let r1 = dispatcher
        .submit(
            ExecutionRequest::new("A", slow_rows(100_000), "SELECT * FROM big"),
            tx.clone(),
        )
        .unwrap();
    assert_eq!(next_event(&mut rx).await.kind, EventKind::Started);

    let fast: Arc<dyn Connection> = Arc::new(MockConnection::with_generated_rows(50));
    let r2 = dispatcher
        .submit(ExecutionRequest::new("A", fast, "SELECT * FROM small"), tx)
        .unwrap();

    let mut events = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        let r2_done = event.id() == r2.id() && event.is_terminal();
        events.push(event);
        if r2_done {
            break;
        }
    }

    let r1_kinds: Vec<EventKind> = events
        .iter()
        .filter(|e| e.id() == r1.id())
        .map(|e| e.kind)
        .collect();
    assert_eq!(r1_kinds.last(), Some(&EventKind::Cancelled));
    assert!(!r1_kinds.contains(&EventKind::Completed));

    let r1_cancelled = events
        .iter()
        .position(|e| e.id() == r1.id() && e.kind == EventKind::Cancelled)
        .unwrap();
    let r2_started = events
        .iter()
        .position(|e| e.id() == r2.id() && e.kind == EventKind::Started)
        .unwrap();
    assert!(r1_cancelled < r2_started, "{:?}", kinds(&events));

    let done = events.last().unwrap();
    assert_eq!(done.kind, EventKind::Completed);
    assert_eq!(done.response.row_count(), 50);
    assert!(!dispatcher.is_running("A"));

    dispatcher.close().await;
}

/// Scenario: Different sources do not cancel each other
/// Given requests for keys "A" and "B"
/// When both are submitted back to back
/// Then both complete, one after the other
#[tokio::test]
async fn test_different_keys_run_serially() {
    let dispatcher = started(EngineConfig::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let a: Arc<dyn Connection> = Arc::new(MockConnection::with_generated_rows(300));
    let b: Arc<dyn Connection> = Arc::new(MockConnection::with_generated_rows(300));
    let ra = dispatcher
        .submit(ExecutionRequest::new("A", a, "SELECT 1"), tx.clone())
        .unwrap();
    let rb = dispatcher
        .submit(ExecutionRequest::new("B", b, "SELECT 2"), tx)
        .unwrap();

    let first = until_terminal(&mut rx).await;
    let second = until_terminal(&mut rx).await;

    assert!(first.iter().all(|e| e.id() == ra.id()));
    assert!(second.iter().all(|e| e.id() == rb.id()));
    assert_eq!(first.last().unwrap().kind, EventKind::Completed);
    assert_eq!(second.last().unwrap().kind, EventKind::Completed);

    dispatcher.close().await;
}

/// Scenario: Statement fails part-way through the result
/// Given a statement that errors after yielding 5 rows
/// When it is executed
/// Then a FAILURE event is emitted
/// And its table keeps the 5 rows fetched before the error
#[tokio::test]
async fn test_failure_keeps_partial_rows() {
    let dispatcher = started(EngineConfig::default());
    let conn: Arc<dyn Connection> = Arc::new(
        MockConnection::with_generated_rows(100).failing_after(5, "division by zero"),
    );

    let (_, mut rx) = submit(&dispatcher, "A", conn, "SELECT 1 / (5 - n) FROM t");
    let events = until_terminal(&mut rx).await;

    assert_eq!(kinds(&events), vec![EventKind::Started, EventKind::Failure]);
    let failure = &events[1].response;
    assert_eq!(failure.table.size(), 5);
    assert_eq!(failure.row_count(), 5);
    assert_eq!(failure.error, Some(PagerError::query("division by zero")));

    dispatcher.close().await;
}

/// Scenario: Progress events are spaced by a doubling batch size
/// Given a query returning 250 rows and a start batch size of 100
/// When it is executed
/// Then RESULTS_AVAILABLE fires at 100 and 200 rows only
/// And COMPLETED reports all 250 rows
#[tokio::test]
async fn test_progress_batches() {
    let dispatcher = started(EngineConfig::default());
    let conn: Arc<dyn Connection> = Arc::new(MockConnection::with_generated_rows(250));

    let (_, mut rx) = submit(&dispatcher, "A", conn, "SELECT * FROM t");
    let events = until_terminal(&mut rx).await;

    let progress: Vec<usize> = events
        .iter()
        .filter(|e| e.kind == EventKind::ResultsAvailable)
        .map(|e| e.response.row_count())
        .collect();
    assert_eq!(progress, vec![100, 200]);

    let done = events.last().unwrap();
    assert_eq!(done.kind, EventKind::Completed);
    assert_eq!(done.response.row_count(), done.response.table.size());
    assert_eq!(done.response.row_count(), 250);

    dispatcher.close().await;
}

/// Scenario: Large results use capped progress batches
/// Given a maximum batch size of 400
/// When 2000 rows are fetched
/// Then progress fires at 100, 200, 400, 800, 1200, 1600 and 2000 rows
#[tokio::test]
async fn test_progress_batch_cap() {
    let engine = EngineConfig {
        max_batch_size: 400,
        ..EngineConfig::default()
    };
    let dispatcher = started(engine);
    let conn: Arc<dyn Connection> = Arc::new(MockConnection::with_generated_rows(2000));

    let (_, mut rx) = submit(&dispatcher, "A", conn, "SELECT * FROM t");
    let events = until_terminal(&mut rx).await;

    let progress: Vec<usize> = events
        .iter()
        .filter(|e| e.kind == EventKind::ResultsAvailable)
        .map(|e| e.response.row_count())
        .collect();
    assert_eq!(progress, vec![100, 200, 400, 800, 1200, 1600, 2000]);

    dispatcher.close().await;
}

/// Scenario: Statement timeout surfaces as a failure
/// Given a one second statement timeout
/// When a statement takes longer than that to produce a result
/// Then a FAILURE event reports the timeout
#[tokio::test]
async fn test_statement_timeout_is_failure() {
    let engine = EngineConfig {
        query_timeout_secs: 1,
        ..EngineConfig::default()
    };
    let dispatcher = started(engine);
    let conn: Arc<dyn Connection> = Arc::new(
        MockConnection::with_generated_rows(10).with_execute_delay(Duration::from_secs(5)),
    );

    let (_, mut rx) = submit(&dispatcher, "A", conn, "SELECT pg_sleep(5)");
    let events = until_terminal(&mut rx).await;

    let failure = events.last().unwrap();
    assert_eq!(failure.kind, EventKind::Failure);
    let message = failure.response.error.as_ref().unwrap().to_string();
    assert!(message.contains("statement timeout"), "{message}");

    dispatcher.close().await;
}

/// Scenario: Cancelling while the statement is still executing
/// Given a statement that takes a long time before its first row
/// When the source cancels it
/// Then CANCELLED follows STARTED without any rows
#[tokio::test]
async fn test_cancel_during_execute() {
    let dispatcher = started(EngineConfig::default());
    let conn: Arc<dyn Connection> = Arc::new(
        MockConnection::with_generated_rows(10).with_execute_delay(Duration::from_secs(5)),
    );

    let (request, mut rx) = submit(&dispatcher, "A", conn, "SELECT pg_sleep(5)");
    assert_eq!(next_event(&mut rx).await.kind, EventKind::Started);
    assert!(dispatcher.cancel(&request).unwrap());

    let last = next_event(&mut rx).await;
    assert_eq!(last.kind, EventKind::Cancelled);
    assert_eq!(last.response.row_count(), 0);
    assert!(!last.response.table.has_col_metadata());

    dispatcher.close().await;
}

/// Scenario: Closing the dispatcher with work queued
/// Given a running request and one waiting behind it
/// When the dispatcher is closed
/// Then the running request is cancelled
/// And the waiting request ends with CANCELLED without starting
/// And nothing is left running
#[tokio::test]
async fn test_close_with_queued_work() {
    let dispatcher = started(EngineConfig::default());

    let (_, mut rx1) = submit(&dispatcher, "A", slow_rows(100_000), "SELECT * FROM big");
    let (_, mut rx2) = submit(&dispatcher, "B", slow_rows(10), "SELECT * FROM small");
    assert_eq!(next_event(&mut rx1).await.kind, EventKind::Started);

    dispatcher.close().await;
    assert_eq!(dispatcher.running_count(), 0);
    assert!(!dispatcher.is_started());

    let last = until_terminal(&mut rx1).await;
    assert_eq!(last.last().unwrap().kind, EventKind::Cancelled);

    let queued = until_terminal(&mut rx2).await;
    assert_eq!(kinds(&queued), vec![EventKind::Cancelled]);
    assert_eq!(queued[0].response.row_count(), 0);

    dispatcher.close().await;
}

/// Scenario: A dispatcher can be restarted after close
#[tokio::test]
async fn test_restart_after_close() {
    let dispatcher = started(EngineConfig::default());
    dispatcher.close().await;
    dispatcher.start().unwrap();

    let conn: Arc<dyn Connection> = Arc::new(MockConnection::with_generated_rows(3));
    let (_, mut rx) = submit(&dispatcher, "A", conn, "SELECT 1");
    let events = until_terminal(&mut rx).await;
    assert_eq!(events.last().unwrap().kind, EventKind::Completed);

    dispatcher.close().await;
}
