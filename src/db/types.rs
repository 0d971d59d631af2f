//! Value and column types for db-pager.
//!
//! Defines the cell values held by the result store and the column type tags
//! captured from a cursor's metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata about a column in a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column type tag.
    pub column_type: ColumnType,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    /// Renders the column as `name [TYPE]`, or just `name` for untyped columns.
    pub fn label(&self) -> String {
        let type_name = self.column_type.display_name();
        if type_name.is_empty() {
            self.name.clone()
        } else {
            format!("{} [{}]", self.name, type_name)
        }
    }
}

/// Column type tag, resolved from the database's type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Char,
    Varchar,
    Text,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Binary,
    Array,
    Uuid,
    Json,
    /// Row identifiers (OID, TID); rendered without a type suffix.
    RowId,
    /// Any type without a dedicated tag, carrying the database's own name.
    Other(String),
}

impl ColumnType {
    /// Maps a database type name (as reported by the driver) to a tag.
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.trim().to_uppercase();
        if upper.ends_with("[]") || upper.starts_with('_') {
            return Self::Array;
        }
        match upper.as_str() {
            "BOOL" | "BOOLEAN" => Self::Boolean,
            "INT2" | "SMALLINT" => Self::SmallInt,
            "INT4" | "INT" | "INTEGER" => Self::Integer,
            "INT8" | "BIGINT" => Self::BigInt,
            "FLOAT4" | "REAL" => Self::Real,
            "FLOAT8" | "DOUBLE PRECISION" | "DOUBLE" => Self::Double,
            "NUMERIC" | "DECIMAL" => Self::Numeric,
            "CHAR" | "BPCHAR" | "CHARACTER" => Self::Char,
            "VARCHAR" | "CHARACTER VARYING" => Self::Varchar,
            "TEXT" | "NAME" | "CITEXT" => Self::Text,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMETZ" => Self::TimeTz,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "BYTEA" | "BINARY" | "VARBINARY" | "BLOB" => Self::Binary,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            "OID" | "TID" => Self::RowId,
            _ => Self::Other(upper),
        }
    }

    /// Returns the label shown next to a column name.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE",
            Self::Numeric => "NUMERIC",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::TimeTz => "TIMETZ",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::Binary => "BINARY",
            Self::Array => "ARRAY",
            Self::Uuid => "UUID",
            Self::Json => "JSON",
            Self::RowId => "",
            Self::Other(name) => name,
        }
    }

    /// Base display width hint for renderers, in pixels.
    ///
    /// Text-like columns return `None`: their width depends on content.
    pub fn display_width(&self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Char | Self::RowId | Self::SmallInt => Some(100),
            Self::Integer => Some(120),
            Self::Date | Self::Time | Self::TimeTz | Self::BigInt => Some(200),
            Self::Timestamp | Self::TimestampTz | Self::Double | Self::Real => Some(250),
            Self::Binary => Some(400),
            Self::Varchar | Self::Text => None,
            _ => Some(150),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts the value to its display representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
