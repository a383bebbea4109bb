//! Result rows and the unmanaged row cursor.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::value::{FromValue, Value};

/// Error type for row access.
#[derive(Debug, Clone)]
pub enum RowError {
    /// Column not found.
    ColumnNotFound(String),
    /// Column index out of range.
    IndexOutOfRange(usize),
    /// Type conversion error.
    TypeConversion { column: String, message: String },
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnNotFound(col) => write!(f, "column '{}' not found", col),
            Self::IndexOutOfRange(i) => write!(f, "column index {} out of range", i),
            Self::TypeConversion { column, message } => {
                write!(f, "type conversion error for '{}': {}", column, message)
            }
        }
    }
}

impl std::error::Error for RowError {}

impl From<RowError> for QueryError {
    fn from(err: RowError) -> Self {
        QueryError::deserialization(err.to_string())
    }
}

/// One result row: column names shared across the result set plus values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. `values` must be in column order.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names in select order. Names may repeat across joined tables.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The first value for a column name.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Convert the value at `index`.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T, RowError> {
        let value = self
            .values
            .get(index)
            .cloned()
            .ok_or(RowError::IndexOutOfRange(index))?;
        T::from_value(value).map_err(|message| RowError::TypeConversion {
            column: self.columns.get(index).cloned().unwrap_or_default(),
            message,
        })
    }

    /// Convert the value of the named column.
    pub fn try_get<T: FromValue>(&self, column: &str) -> Result<T, RowError> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| RowError::ColumnNotFound(column.to_string()))?;
        self.get(index)
    }

    /// Consume the row into `(column, value)` pairs.
    pub fn into_pairs(self) -> impl Iterator<Item = (String, Value)> {
        let columns = self.columns;
        self.values
            .into_iter()
            .enumerate()
            .map(move |(i, v)| (columns.get(i).cloned().unwrap_or_default(), v))
    }
}

/// A buffered cursor over result rows.
///
/// Drivers materialize the result set; the cursor hands rows out one at a
/// time and can be scanned into records with
/// [`Db::scan_row`](crate::Db::scan_row).
#[derive(Debug, Clone, Default)]
pub struct Rows {
    columns: Arc<[String]>,
    rows: VecDeque<Row>,
}

impl Rows {
    /// Create a cursor from column names and rows.
    pub fn new(columns: Arc<[String]>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// Build a cursor from column names and raw value vectors.
    pub fn from_values(columns: Vec<String>, values: Vec<Vec<Value>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        let rows = values
            .into_iter()
            .map(|v| Row::new(Arc::clone(&columns), v))
            .collect();
        Self::new(columns, rows)
    }

    /// Column names of the result set.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Remaining rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether all rows have been consumed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Collect the remaining rows.
    pub fn into_vec(self) -> Vec<Row> {
        self.rows.into()
    }

    /// Convert the first column of every remaining row.
    pub fn column_values<T: FromValue>(self) -> QueryResult<Vec<T>> {
        self.rows
            .into_iter()
            .map(|row| row.get::<T>(0).map_err(QueryError::from))
            .collect()
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }
}
