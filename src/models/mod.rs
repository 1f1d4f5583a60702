//! Data model shared by the discovery, invocation and document layers
//!
//! Result sets are schema-agnostic: column names and types are only known
//! once a procedure has returned, so every row is a positional list of
//! [`Value`]s sharing its column names with the rest of its [`ResultSet`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pairs a logical unit name with the procedure that produces its data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureMapping {
    pub unit_name: String,
    pub procedure_name: String,
}

impl ProcedureMapping {
    pub fn new<U: Into<String>, P: Into<String>>(unit_name: U, procedure_name: P) -> Self {
        Self {
            unit_name: unit_name.into(),
            procedure_name: procedure_name.into(),
        }
    }
}

/// Dynamically-typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Name written to the `type` attribute of a serialized column
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Column metadata as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Backend type name (`INT4`, `TEXT`, ...); empty when unknown
    pub type_name: String,
}

impl Column {
    pub fn new<N: Into<String>, T: Into<String>>(name: N, type_name: T) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One row of a result set
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// First value whose column carries `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Column name/value pairs in metadata order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Materialized rows of one procedure invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    columns: Vec<Column>,
    names: Arc<[String]>,
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<Column>) -> Self {
        let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();
        Self {
            columns,
            names,
            rows: Vec::new(),
        }
    }

    /// Build a result set from untyped column names and positional values
    pub fn from_rows<S: AsRef<str>>(column_names: &[S], rows: Vec<Vec<Value>>) -> Self {
        let columns = column_names
            .iter()
            .map(|name| Column::new(name.as_ref(), ""))
            .collect();
        let mut result = Self::new(columns);
        for values in rows {
            result.push_row(values);
        }
        result
    }

    pub fn push_row(&mut self, values: Vec<Value>) {
        self.rows.push(Row::new(Arc::clone(&self.names), values));
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Serialized output for one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub unit_name: String,
    pub content: String,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_by_column_name() {
        let result = ResultSet::from_rows(
            &["id", "val"],
            vec![vec![Value::Integer(1), Value::Float(10.5)]],
        );

        let row = &result.rows()[0];
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get("val"), Some(&Value::Float(10.5)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.column_names(), ["id", "val"]);
    }

    #[test]
    fn test_duplicate_column_names_are_kept_positionally() {
        let result = ResultSet::from_rows(
            &["id", "id"],
            vec![vec![Value::Integer(1), Value::Integer(2)]],
        );

        let pairs: Vec<_> = result.rows()[0].iter().collect();
        assert_eq!(pairs, vec![("id", &Value::Integer(1)), ("id", &Value::Integer(2))]);
        assert_eq!(result.rows()[0].get("id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_option_converts_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".to_string()));
        assert_eq!(Value::Null.type_name(), "null");
    }
}
