//! A single materialized result row.

use crate::db::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// One row of a result set.
///
/// The index is the row's position in its table and its sole identity: two rows
/// are equal iff their indices are equal.
#[derive(Debug, Clone)]
pub struct Row {
    index: usize,
    values: Box<[Value]>,
    rendered: OnceLock<String>,
}

impl Row {
    /// Creates a row at `index` holding `values`.
    pub fn new(index: usize, values: impl Into<Box<[Value]>>) -> Self {
        Self {
            index,
            values: values.into(),
            rendered: OnceLock::new(),
        }
    }

    /// Position of the row in its table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell at `col`, or `None` when out of range.
    pub fn value(&self, col: usize) -> Option<&Value> {
        self.values.get(col)
    }

    /// All cells in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Blanks every cell and drops the cached rendering.
    pub fn clear(&mut self) {
        self.values.fill(Value::Null);
        self.rendered.take();
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Row {}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self.rendered.get_or_init(|| {
            self.values
                .iter()
                .map(|v| match v {
                    Value::Null => "null".to_string(),
                    other => other.to_display_string(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        });
        f.write_str(rendered)
    }
}
