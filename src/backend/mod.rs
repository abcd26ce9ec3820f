//! # Relational backend
//!
//! The engine never talks to a database directly. It renders SQL text and
//! hands it to a [`SqlBackend`], which returns rows as ordered
//! `(column, value)` pairs. Every other select primitive derives from
//! [`SqlBackend::select_all`].

mod scripted;

pub use scripted::{ScriptRule, ScriptedBackend};

use serde_json::{Map, Value};
use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend errors are propagated unchanged by the query layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("Statement failed: {message} (sql: {sql})")]
    Statement { sql: String, message: String },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected value in column {column}: {value}")]
    Decode { column: String, value: String },
}

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((column.into(), value.into()));
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Value of the first selected column.
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn values(&self) -> Vec<Value> {
        self.columns.iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column map form, as returned by `select_all`.
    pub fn to_map(&self) -> Map<String, Value> {
        self.columns.iter().cloned().collect()
    }

    /// The `id` column as an integer, if present and numeric.
    pub fn id(&self) -> Option<i64> {
        self.get("id").and_then(value_as_i64)
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Row {
            columns: map.into_iter().collect(),
        }
    }
}

/// Interpret a database value as an integer id. Accepts numbers and
/// numeric strings, which is how most drivers hand back `SELECT id`.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A relational store that accepts ad hoc SELECT statements.
pub trait SqlBackend: Send + Sync {
    /// Run a statement and return every row.
    fn select_all(&self, sql: &str) -> BackendResult<Vec<Row>>;

    /// First row, if any.
    fn select_one(&self, sql: &str) -> BackendResult<Option<Row>> {
        Ok(self.select_all(sql)?.into_iter().next())
    }

    /// Every row as a plain value list.
    fn select_rows(&self, sql: &str) -> BackendResult<Vec<Vec<Value>>> {
        Ok(self.select_all(sql)?.iter().map(Row::values).collect())
    }

    /// First column of every row.
    fn select_values(&self, sql: &str) -> BackendResult<Vec<Value>> {
        Ok(self
            .select_all(sql)?
            .iter()
            .filter_map(|row| row.first().cloned())
            .collect())
    }

    /// First column of the first row.
    fn select_value(&self, sql: &str) -> BackendResult<Option<Value>> {
        Ok(self
            .select_one(sql)?
            .and_then(|row| row.first().cloned()))
    }

    /// First column of every row, decoded as integer ids.
    fn select_ids(&self, sql: &str) -> BackendResult<Vec<i64>> {
        self.select_values(sql)?
            .iter()
            .map(|v| {
                value_as_i64(v).ok_or_else(|| BackendError::Decode {
                    column: "id".into(),
                    value: v.to_string(),
                })
            })
            .collect()
    }
}
