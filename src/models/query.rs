//! Query-related data models.
//!
//! This module defines the parameter values callers bind and the two canonical
//! result shapes every dialect is normalized into.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value. PostgreSQL receives it with an unspecified type and
    /// infers one from context; a bare `SELECT ?` has nothing to infer from
    /// and needs an explicit cast such as `?::int`.
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// One result row: column name to JSON value, in column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// Canonical result of a read statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl SelectResult {
    /// Build a result from rows, taking column names from the first row.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self { columns, rows }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row, if any.
    pub fn first_value(&self) -> Option<&JsonValue> {
        self.rows.first().and_then(|row| row.values().next())
    }

    /// First column of the first row read as an integer.
    ///
    /// Accepts numeric strings, which some drivers return for COUNT/NUMERIC columns.
    pub fn scalar_i64(&self) -> Option<i64> {
        json_as_i64(self.first_value()?)
    }
}

/// Canonical result of a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    /// Generated key of an INSERT, when the engine produced one.
    pub inserted_id: Option<i64>,
    pub affected_row_count: u64,
}

/// Normalized outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Select(SelectResult),
    Mutation(MutationResult),
}

impl Outcome {
    pub fn into_select(self) -> Option<SelectResult> {
        match self {
            Self::Select(result) => Some(result),
            Self::Mutation(_) => None,
        }
    }

    pub fn into_mutation(self) -> Option<MutationResult> {
        match self {
            Self::Mutation(result) => Some(result),
            Self::Select(_) => None,
        }
    }
}

/// Read a JSON value as an integer, accepting integral floats and numeric strings.
pub(crate) fn json_as_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|v| i64::try_from(v).ok()))
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
