//! db-pager - background SQL execution with incremental, paged results.
//!
//! This library exposes the core modules for use by the binary and integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod logging;
pub mod paging;
pub mod store;
