//! Cell values stored in geometry tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One table cell.
///
/// The store is typed: every column declares a [`ColumnType`](super::ColumnType).
/// No column is nullable, so inserts reject `Null` everywhere. It can still
/// arrive through a hand-edited snapshot; the reader then reports the row as
/// malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

/// A table row: cells in schema column order. The row id is implicit.
pub type Row = Vec<Cell>;

impl Cell {
    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Null => "NULL",
            Cell::Int(_) => "INTEGER",
            Cell::Float(_) => "FLOAT",
            Cell::Text(_) => "TEXT",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats; the store never holds a float in an
    /// integer column, so the reverse is not offered.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Cell::Float(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Cell { fn from(v: i64) -> Self { Cell::Int(v) } }
impl From<u32> for Cell { fn from(v: u32) -> Self { Cell::Int(i64::from(v)) } }
impl From<f64> for Cell { fn from(v: f64) -> Self { Cell::Float(v) } }
impl From<String> for Cell { fn from(v: String) -> Self { Cell::Text(v) } }
impl From<&str> for Cell { fn from(v: &str) -> Self { Cell::Text(v.to_owned()) } }

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NULL"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Cell::from(3u32), Cell::Int(3));
        assert_eq!(Cell::from("x"), Cell::Text("x".into()));
        assert_eq!(Cell::Int(2).as_float(), Some(2.0));
        assert_eq!(Cell::Float(2.0).as_int(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Cell::Text("it's".into()).to_string(), "'it\\'s'");
        assert_eq!(Cell::Float(0.5).to_string(), "0.5");
        assert_eq!(Cell::Null.to_string(), "NULL");
    }
}
