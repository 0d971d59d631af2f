//! PostgreSQL connection implementation.
//!
//! Provides `PostgresConnection`, which implements the `Connection` trait for
//! PostgreSQL using sqlx. Rows are streamed from a producer task through a
//! bounded channel so that the consumer can stop at any row boundary.

use crate::config::ConnectionConfig;
use crate::db::{ColumnType, Connection, RowCursor, RowSource, StatementOutcome, Value};
use crate::error::{PagerError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgQueryResult, PgRow};
use sqlx::{Column as SqlxColumn, Connection as SqlxConnection, Either, Executor, Row, TypeInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// How long a validity check may take before the connection counts as lost.
const VALIDITY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Rows buffered between the producer task and the cursor.
const ROW_BUFFER: usize = 256;

type FetchItem = std::result::Result<Either<PgQueryResult, PgRow>, sqlx::Error>;

/// PostgreSQL connection handle backed by a sqlx pool.
#[derive(Debug)]
pub struct PostgresConnection {
    id: String,
    pool: PgPool,
}

impl PostgresConnection {
    /// Wraps an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            id: next_connection_id(),
            pool,
        }
    }

    /// Connects to the configured database, retrying transient failures with
    /// exponential backoff.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    let conn = Self::from_pool(pool);
                    debug!("Connected [{}] to {}", conn.id, config.display_string());
                    return Ok(conn);
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => PagerError::connection("No connection attempt was made"),
        })
    }
}

fn next_connection_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("pg-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[async_trait]
impl Connection for PostgresConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn is_valid(&self) -> bool {
        if self.pool.is_closed() {
            return false;
        }
        let check = async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await
        };
        matches!(
            tokio::time::timeout(VALIDITY_CHECK_TIMEOUT, check).await,
            Ok(Ok(()))
        )
    }

    async fn execute(&self, sql: &str, timeout: Duration) -> Result<StatementOutcome> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| PagerError::connection(format!("[{}] {e}", self.id)))?;

        // Enforced by the server, so a runaway statement is stopped even if the
        // client side goes away.
        let set_timeout = format!("SET statement_timeout = {}", timeout.as_millis());
        (&mut *conn)
            .execute(set_timeout.as_str())
            .await
            .map_err(|e| PagerError::query(format_query_error(e)))?;

        let (tx, mut rx) = mpsc::channel::<FetchItem>(ROW_BUFFER);
        let sql = sql.to_string();
        let producer = tokio::spawn(async move {
            let mut stream = (&mut *conn).fetch_many(sql.as_str());
            while let Some(item) = stream.next().await {
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        // The cursor aborts the producer when dropped, including when this
        // future is dropped before the first result arrives.
        let mut cursor = PostgresCursor {
            rx,
            pending: None,
            finished: false,
            producer,
        };
        match cursor.rx.recv().await {
            None => Ok(StatementOutcome::UpdateCount(0)),
            Some(Err(e)) => Err(PagerError::query(format_query_error(e))),
            Some(Ok(Either::Left(result))) => Ok(StatementOutcome::UpdateCount(
                result.rows_affected(),
            )),
            Some(Ok(Either::Right(first))) => {
                cursor.pending = Some(first);
                Ok(StatementOutcome::ResultSet(Box::new(cursor)))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Cursor over rows streamed by a producer task.
///
/// Only the first result set of a multi-statement script is read; the cursor
/// ends at the first statement boundary.
pub struct PostgresCursor {
    rx: mpsc::Receiver<FetchItem>,
    pending: Option<PgRow>,
    finished: bool,
    producer: JoinHandle<()>,
}

impl PostgresCursor {
    fn finish(&mut self) {
        self.finished = true;
        self.pending = None;
        self.rx.close();
        self.producer.abort();
    }
}

#[async_trait]
impl RowCursor for PostgresCursor {
    async fn next_row(&mut self) -> Result<Option<Box<dyn RowSource>>> {
        if let Some(row) = self.pending.take() {
            return Ok(Some(Box::new(PgRowSource(row))));
        }
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            None => {
                self.finished = true;
                Ok(None)
            }
            Some(Ok(Either::Right(row))) => Ok(Some(Box::new(PgRowSource(row)))),
            // End of the first statement's rows.
            Some(Ok(Either::Left(_))) => {
                self.finish();
                Ok(None)
            }
            Some(Err(e)) => {
                self.finish();
                Err(PagerError::query(format_query_error(e)))
            }
        }
    }

    async fn close(&mut self) {
        self.finish();
    }
}

impl Drop for PostgresCursor {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

struct PgRowSource(PgRow);

impl RowSource for PgRowSource {
    fn column_count(&self) -> usize {
        self.0.columns().len()
    }

    fn column_name(&self, index: usize) -> String {
        self.0
            .columns()
            .get(index)
            .map(|c| c.name().to_string())
            .unwrap_or_default()
    }

    fn column_type_name(&self, index: usize) -> String {
        self.0
            .columns()
            .get(index)
            .map(|c| c.type_info().name().to_string())
            .unwrap_or_default()
    }

    fn value(&self, index: usize, column_type: &ColumnType) -> Value {
        convert_value(&self.0, index, column_type)
    }
}

/// Decodes a single cell of a PgRow according to its column type.
fn convert_value(row: &PgRow, index: usize, column_type: &ColumnType) -> Value {
    match column_type {
        ColumnType::Boolean => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        ColumnType::SmallInt => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        ColumnType::Integer => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        ColumnType::BigInt => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        ColumnType::Real => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        ColumnType::Double => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        ColumnType::Binary => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // Statements run over the simple query protocol, so every other type
        // arrives in its text representation
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
        || error_str.contains("ssl")
        || error_str.contains("tls")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> PagerError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        PagerError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        PagerError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        PagerError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        PagerError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        PagerError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        PagerError::connection(error.to_string())
    }
}

/// Formats a query error, keeping the server's DETAIL/HINT/context fields.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        let fields = [
            ("DETAIL", pg_error.detail()),
            ("HINT", pg_error.hint()),
            ("TABLE", pg_error.table()),
            ("COLUMN", pg_error.column()),
            ("CONSTRAINT", pg_error.constraint()),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                result.push_str("\n  ");
                result.push_str(label);
                result.push_str(": ");
                result.push_str(value);
            }
        }
    }

    result
}
