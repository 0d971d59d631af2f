//! Integration tests for db-pager.

pub mod common;
pub mod dispatcher_test;
pub mod postgres_test;
