//! End-to-end execution against PostgreSQL.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable to run them.

use super::common::{kinds, next_event, started, submit, until_terminal};
use db_pager::config::{ConnectionConfig, EngineConfig};
use db_pager::db::{ColumnType, Connection, PostgresConnection, Value};
use db_pager::executor::EventKind;
use db_pager::paging::PagedView;
use std::sync::Arc;

/// Helper to create a test connection.
async fn get_test_connection() -> Option<Arc<dyn Connection>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    let conn = PostgresConnection::connect(&config).await.ok()?;
    Some(Arc::new(conn))
}

/// Scenario: Streaming a generated result into pages
/// Given a query returning 2500 generated rows
/// When it runs to completion
/// Then progress fires at 100, 200, 400, 800 and 1600 rows
/// And the last page holds rows 2000 to 2499
#[tokio::test]
async fn test_generated_rows_are_paged() {
    let Some(conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = started(EngineConfig::default());

    let (_, mut rx) = submit(
        &dispatcher,
        "pg",
        Arc::clone(&conn),
        "SELECT n::int8 AS n, 'v' || n AS label FROM generate_series(1, 2500) AS n",
    );
    let events = until_terminal(&mut rx).await;
    let progress: Vec<usize> = events
        .iter()
        .filter(|e| e.kind == EventKind::ResultsAvailable)
        .map(|e| e.response.row_count())
        .collect();
    assert_eq!(progress, vec![100, 200, 400, 800, 1600]);

    let done = events.last().unwrap();
    assert_eq!(done.kind, EventKind::Completed);
    assert_eq!(done.response.row_count(), 2500);

    let mut view = PagedView::new(1000);
    view.attach(Arc::clone(&done.response.table));
    view.next_page();
    view.next_page();
    assert_eq!((view.page_start(), view.page_end()), (2000, 2500));
    assert_eq!(view.value_at(0, 0), Some(Value::Int(2001)));
    assert_eq!(view.column_type(0), ColumnType::BigInt);

    dispatcher.close().await;
    conn.close().await.unwrap();
}

/// Scenario: Database error
/// Given a query against a table that does not exist
/// When it runs
/// Then STARTED is followed by FAILURE carrying the database message
#[tokio::test]
async fn test_missing_table_fails() {
    let Some(conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = started(EngineConfig::default());

    let (_, mut rx) = submit(
        &dispatcher,
        "pg",
        Arc::clone(&conn),
        "SELECT * FROM db_pager_missing_table",
    );
    let events = until_terminal(&mut rx).await;
    assert_eq!(kinds(&events), vec![EventKind::Started, EventKind::Failure]);
    let message = events[1].response.error.as_ref().unwrap().to_string();
    assert!(message.contains("db_pager_missing_table"), "{message}");

    dispatcher.close().await;
    conn.close().await.unwrap();
}

/// Scenario: Superseding a slow query
/// Given a sleeping query for source "pg"
/// When a new query is submitted for "pg"
/// Then the sleeping query is cancelled and the new one completes
#[tokio::test]
async fn test_slow_query_is_superseded() {
    let Some(conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = started(EngineConfig::default());

    let (_, mut slow) = submit(&dispatcher, "pg", Arc::clone(&conn), "SELECT pg_sleep(20)");
    assert_eq!(next_event(&mut slow).await.kind, EventKind::Started);
    let (_, mut fast) = submit(&dispatcher, "pg", Arc::clone(&conn), "SELECT 1 AS one");

    let slow_events = until_terminal(&mut slow).await;
    assert_eq!(slow_events.last().unwrap().kind, EventKind::Cancelled);

    let fast_events = until_terminal(&mut fast).await;
    let done = fast_events.last().unwrap();
    assert_eq!(done.kind, EventKind::Completed);
    assert_eq!(done.response.table.value_at(0, 0), Some(Value::Int(1)));

    dispatcher.close().await;
    conn.close().await.unwrap();
}

/// Scenario: Statements without a result set report an update count
#[tokio::test]
async fn test_update_count() {
    let Some(conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = started(EngineConfig::default());

    let (_, mut rx) = submit(
        &dispatcher,
        "pg",
        Arc::clone(&conn),
        "CREATE TEMP TABLE IF NOT EXISTS db_pager_tmp (id int)",
    );
    let done = until_terminal(&mut rx).await.pop().unwrap();
    assert_eq!(done.kind, EventKind::Completed);
    assert_eq!(done.response.update_count, Some(0));
    assert_eq!(done.response.row_count(), 0);

    dispatcher.close().await;
    conn.close().await.unwrap();
}

/// Scenario: Multi-statement script
/// Given a script whose two SELECTs have different columns
/// When it runs to completion
/// Then only the first statement's rows and metadata are materialized
#[tokio::test]
async fn test_only_first_result_set_is_materialized() {
    let Some(conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dispatcher = started(EngineConfig::default());

    let (_, mut rx) = submit(
        &dispatcher,
        "pg",
        Arc::clone(&conn),
        "SELECT 1 AS a; SELECT 'x' AS b, 2 AS c",
    );
    let done = until_terminal(&mut rx).await.pop().unwrap();
    assert_eq!(done.kind, EventKind::Completed);

    let table = &done.response.table;
    assert_eq!(table.size(), 1);
    assert_eq!(table.column_count(), 1);
    assert_eq!(table.column_name(0), Some("a"));
    assert_eq!(table.value_at(0, 0), Some(Value::Int(1)));

    dispatcher.close().await;
    conn.close().await.unwrap();
}
