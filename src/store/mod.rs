//! Result store: rows and the tables that accumulate them.

mod row;
mod table;

pub use row::Row;
pub use table::Table;
