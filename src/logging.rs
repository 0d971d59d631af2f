//! Tracing setup.
//!
//! Stdout carries query output, so diagnostics go to stderr unless a log file
//! is requested. `RUST_LOG` overrides the default `info` level.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const LOG_DIR: &str = "db-pager";
const LOG_NAME: &str = "db-pager.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Creates the parent directory and opens `path` empty.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Each session starts with an empty log.
    File::create(path)
}

/// Sends tracing output to `path`, or to [`get_log_path`] when none is given.
///
/// If the file cannot be opened, a warning is printed and output goes to stderr.
pub fn init_file_logging(path: Option<&Path>) {
    let log_path = path.map(Path::to_path_buf).unwrap_or_else(get_log_path);

    match open_log_file(&log_path) {
        Ok(log_file) => tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(log_file)
            .with_ansi(false)
            .init(),
        Err(e) => {
            eprintln!("Warning: cannot log to {}: {e}", log_path.display());
            init_stderr_logging();
        }
    }
}

/// Sends tracing output to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .init();
}

/// Default log location: the platform state dir, then the config dir, then the temp dir.
pub fn get_log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::config_dir)
        .map(|dir| dir.join(LOG_DIR).join(LOG_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_NAME))
}
