//! Typed tabular storage collaborator.
//!
//! Both interchange formats are sets of named tables with named scalar
//! headers and named typed columns. The algorithms in this crate address
//! tables only through [`TabularStore`]; the concrete on-disk encoding is a
//! store implementation detail ([`json::JsonTabularStore`] ships with the
//! crate).

mod json;

pub use json::JsonTabularStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("table '{table}' not found in store")]
    TableNotFound { table: String },
    #[error("table '{table}' has no column '{column}'")]
    ColumnNotFound { table: String, column: String },
    #[error("column '{column}' in table '{table}' is not of type {expected}")]
    ColumnType {
        table: String,
        column: String,
        expected: &'static str,
    },
    #[error("table '{table}' has no header '{header}'")]
    HeaderNotFound { table: String, header: String },
    #[error("header '{header}' in table '{table}' is not of type {expected}")]
    HeaderType {
        table: String,
        header: String,
        expected: &'static str,
    },
    #[error("columns of table '{table}' have unequal lengths ({first} vs {second})")]
    RaggedTable {
        table: String,
        first: usize,
        second: usize,
    },
    #[error("store i/o failed for '{path}': {detail}")]
    Io { path: String, detail: String },
    #[error("refusing to overwrite existing file '{path}'")]
    AlreadyExists { path: String },
}

pub type TableResult<T> = Result<T, TableError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    /// Variable-length integer sub-arrays, one per row.
    IntArrays(Vec<Vec<i64>>),
    /// Variable-length float sub-arrays, one per row.
    FloatArrays(Vec<Vec<f64>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(values) => values.len(),
            Self::Float(values) => values.len(),
            Self::Bool(values) => values.len(),
            Self::IntArrays(rows) => rows.len(),
            Self::FloatArrays(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One named table: scalar headers plus equal-length named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub headers: BTreeMap<String, HeaderValue>,
    pub columns: BTreeMap<String, Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: BTreeMap::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: HeaderValue) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    /// Number of rows, validated to be consistent across all columns.
    pub fn rows(&self) -> TableResult<usize> {
        let mut rows: Option<usize> = None;
        for column in self.columns.values() {
            match rows {
                None => rows = Some(column.len()),
                Some(first) if first != column.len() => {
                    return Err(TableError::RaggedTable {
                        table: self.name.clone(),
                        first,
                        second: column.len(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(rows.unwrap_or(0))
    }

    fn column(&self, name: &str) -> TableResult<&Column> {
        self.columns.get(name).ok_or_else(|| TableError::ColumnNotFound {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn int_column(&self, name: &str) -> TableResult<&[i64]> {
        match self.column(name)? {
            Column::Int(values) => Ok(values),
            _ => Err(self.column_type_error(name, "Int")),
        }
    }

    pub fn float_column(&self, name: &str) -> TableResult<&[f64]> {
        match self.column(name)? {
            Column::Float(values) => Ok(values),
            _ => Err(self.column_type_error(name, "Float")),
        }
    }

    pub fn bool_column(&self, name: &str) -> TableResult<&[bool]> {
        match self.column(name)? {
            Column::Bool(values) => Ok(values),
            _ => Err(self.column_type_error(name, "Bool")),
        }
    }

    pub fn int_array_column(&self, name: &str) -> TableResult<&[Vec<i64>]> {
        match self.column(name)? {
            Column::IntArrays(rows) => Ok(rows),
            _ => Err(self.column_type_error(name, "IntArrays")),
        }
    }

    pub fn float_array_column(&self, name: &str) -> TableResult<&[Vec<f64>]> {
        match self.column(name)? {
            Column::FloatArrays(rows) => Ok(rows),
            _ => Err(self.column_type_error(name, "FloatArrays")),
        }
    }

    /// Optional float column: `None` when absent, error when mistyped.
    pub fn optional_float_column(&self, name: &str) -> TableResult<Option<&[f64]>> {
        if !self.has_column(name) {
            return Ok(None);
        }
        self.float_column(name).map(Some)
    }

    pub fn optional_int_column(&self, name: &str) -> TableResult<Option<&[i64]>> {
        if !self.has_column(name) {
            return Ok(None);
        }
        self.int_column(name).map(Some)
    }

    fn header(&self, name: &str) -> TableResult<&HeaderValue> {
        self.headers.get(name).ok_or_else(|| TableError::HeaderNotFound {
            table: self.name.clone(),
            header: name.to_string(),
        })
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn int_header(&self, name: &str) -> TableResult<i64> {
        match self.header(name)? {
            HeaderValue::Int(value) => Ok(*value),
            _ => Err(self.header_type_error(name, "Int")),
        }
    }

    pub fn float_header(&self, name: &str) -> TableResult<f64> {
        match self.header(name)? {
            HeaderValue::Float(value) => Ok(*value),
            // Integer-valued scalars are accepted where a float is expected.
            HeaderValue::Int(value) => Ok(*value as f64),
            _ => Err(self.header_type_error(name, "Float")),
        }
    }

    pub fn bool_header(&self, name: &str) -> TableResult<bool> {
        match self.header(name)? {
            HeaderValue::Bool(value) => Ok(*value),
            _ => Err(self.header_type_error(name, "Bool")),
        }
    }

    pub fn text_header(&self, name: &str) -> TableResult<&str> {
        match self.header(name)? {
            HeaderValue::Text(value) => Ok(value),
            _ => Err(self.header_type_error(name, "Text")),
        }
    }

    pub fn optional_text_header(&self, name: &str) -> TableResult<Option<&str>> {
        if !self.has_header(name) {
            return Ok(None);
        }
        self.text_header(name).map(Some)
    }

    fn column_type_error(&self, column: &str, expected: &'static str) -> TableError {
        TableError::ColumnType {
            table: self.name.clone(),
            column: column.to_string(),
            expected,
        }
    }

    fn header_type_error(&self, header: &str, expected: &'static str) -> TableError {
        TableError::HeaderType {
            table: self.name.clone(),
            header: header.to_string(),
            expected,
        }
    }
}

/// Named-table storage contract. The core reads and writes whole tables by
/// extension name and never sees file offsets.
pub trait TabularStore {
    fn read_table(&self, name: &str) -> TableResult<Table>;
    fn write_table(&mut self, table: Table) -> TableResult<()>;
}
