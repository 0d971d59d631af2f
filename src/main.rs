//! db-pager - runs a SQL query in the background and prints one page of its result.

mod cli;

use cli::{Cli, OutputFormat};
use db_pager::config::{Config, ConnectionConfig, EngineConfig};
use db_pager::db::{Connection, MockConnection, PostgresConnection};
use db_pager::error::{PagerError, Result};
use db_pager::executor::{EventKind, ExecutionDispatcher, ExecutionEvent, ExecutionRequest};
use db_pager::logging;
use db_pager::paging::PagedView;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const SOURCE_KEY: &str = "cli";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(Some(path)),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.output_format().map_err(PagerError::config)?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let mut engine = config.engine;
    if let Some(page_size) = cli.page_size {
        engine.page_size = page_size;
    }
    engine.validate()?;

    let sql = read_sql(&cli).await?;
    let connection = open_connection(&cli, &config).await?;

    let dispatcher = ExecutionDispatcher::new(engine);
    dispatcher.start()?;

    let outcome = run_query(&dispatcher, Arc::clone(&connection), sql).await;
    dispatcher.close().await;
    if let Err(e) = connection.close().await {
        warn!("Failed to close connection [{}]: {}", connection.id(), e);
    }

    let event = outcome?;
    print_outcome(&event, &cli, &engine, format)
}

/// Returns the SQL from `--execute`, or all of stdin.
async fn read_sql(cli: &Cli) -> Result<String> {
    let sql = match &cli.execute {
        Some(sql) => sql.clone(),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .map_err(|e| PagerError::config(format!("Failed to read SQL from stdin: {e}")))?;
            buf
        }
    };
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(PagerError::config("No SQL given. Use --execute or pipe it on stdin"));
    }
    Ok(sql.to_string())
}

async fn open_connection(cli: &Cli, config: &Config) -> Result<Arc<dyn Connection>> {
    if cli.mock {
        info!("Using mock database with {} rows", cli.mock_rows);
        return Ok(Arc::new(MockConnection::with_generated_rows(cli.mock_rows)));
    }

    let conn = resolve_connection(cli, config)?.ok_or_else(|| {
        PagerError::config("No database connection configured. Use --help for usage information")
    })?;
    info!("Connection: {}", conn.display_string());
    Ok(Arc::new(PostgresConnection::connect(&conn).await?))
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(PagerError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}

/// Submits `sql` and waits for its terminal event, cancelling on Ctrl-C.
async fn run_query(
    dispatcher: &ExecutionDispatcher,
    connection: Arc<dyn Connection>,
    sql: String,
) -> Result<ExecutionEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let request = dispatcher.submit(ExecutionRequest::new(SOURCE_KEY, connection, sql), tx)?;

    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                if dispatcher.cancel(&request)? {
                    eprintln!("Cancelling {}...", request.id());
                }
                continue;
            }
        };
        let Some(event) = event else {
            return Err(PagerError::internal(format!(
                "Execution {} ended without a terminal event",
                request.id()
            )));
        };

        match event.kind {
            EventKind::Started => eprintln!("Started {}", request.id()),
            EventKind::ResultsAvailable => eprintln!(
                "{} rows fetched ({} ms)",
                event.response.row_count(),
                event.response.total_ms
            ),
            _ => return Ok(event),
        }
    }
}

fn print_outcome(
    event: &ExecutionEvent,
    cli: &Cli,
    engine: &EngineConfig,
    format: OutputFormat,
) -> Result<()> {
    let response = &event.response;
    if let Some(count) = response.update_count {
        println!("{count} rows affected ({} ms)", response.total_ms);
        return Ok(());
    }

    let mut view = PagedView::from(engine);
    view.attach(Arc::clone(&response.table));
    while view.current_page() < cli.page && view.can_next_page() {
        view.next_page();
    }
    if view.current_page() < cli.page {
        warn!(
            "Page {} is past the end, showing page {}",
            cli.page,
            view.current_page()
        );
    }

    let mut out = io::stdout().lock();
    let written = match format {
        OutputFormat::Text => write_text(&view, &mut out),
        OutputFormat::Json => write_json(&view, &mut out),
    };
    written.map_err(|e| PagerError::internal(format!("Failed to write output: {e}")))?;

    eprintln!(
        "{} {}: page {}/{}, rows {}-{} of {} ({} ms, exec {} ms, fetch {} ms)",
        event.kind,
        event.id(),
        view.current_page() + 1,
        view.max_page() + 1,
        view.page_start(),
        view.page_end(),
        view.table_size(),
        response.total_ms,
        response.exec_ms,
        response.fetch_ms
    );

    match (event.kind, &response.error) {
        (EventKind::Failure, Some(e)) => Err(e.clone()),
        _ => Ok(()),
    }
}

fn write_text(view: &PagedView, out: &mut impl Write) -> io::Result<()> {
    let columns = view.column_count();
    if columns == 0 {
        return Ok(());
    }
    let header: Vec<String> = (0..columns)
        .map(|col| view.column_label(col).unwrap_or_default())
        .collect();
    writeln!(out, "{}", header.join("\t"))?;

    for row in 0..view.row_count_in_page() {
        let cells: Vec<String> = (0..columns)
            .map(|col| {
                view.value_at(row, col)
                    .map(|v| v.to_display_string())
                    .unwrap_or_default()
            })
            .collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

fn write_json(view: &PagedView, out: &mut impl Write) -> io::Result<()> {
    for row in 0..view.row_count_in_page() {
        let object: serde_json::Map<String, serde_json::Value> = (0..view.column_count())
            .map(|col| {
                let name = view.column_name(col).unwrap_or_default().to_string();
                let value = view
                    .value_at(row, col)
                    .and_then(|v| serde_json::to_value(v).ok())
                    .unwrap_or(serde_json::Value::Null);
                (name, value)
            })
            .collect();
        writeln!(out, "{}", serde_json::Value::Object(object))?;
    }
    Ok(())
}
