//! Row cursor abstraction
//!
//! [`Record`] is the read side every field accessor works against. [`RowSet`]
//! is the forward-only cursor returned by `execute_reader`, materialized from
//! the driver or supplied directly by a scripted expectation.

use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::value::Value;

/// Read access to the columns of one row
pub trait Record {
    /// Number of columns
    fn field_count(&self) -> usize;

    /// Name of the column at `ordinal`
    fn column_name(&self, ordinal: usize) -> Result<&str>;

    /// Zero-based position of a column; exact match first, then ASCII case-insensitive
    fn ordinal(&self, name: &str) -> Result<usize>;

    /// Cell at `ordinal`
    fn value(&self, ordinal: usize) -> Result<&Value>;

    fn is_null(&self, ordinal: usize) -> Result<bool> {
        Ok(self.value(ordinal)?.is_null())
    }

    /// Copy up to `buffer.len()` bytes of a blob (or text) cell starting at
    /// `offset`; returns the count copied, 0 past the end or for null
    fn read_bytes(&self, ordinal: usize, offset: usize, buffer: &mut [u8]) -> Result<usize> {
        let bytes: &[u8] = match self.value(ordinal)? {
            Value::Blob(b) => b,
            Value::Text(s) => s.as_bytes(),
            Value::Null => &[],
            other => {
                return Err(DataError::InvalidCast {
                    ordinal,
                    expected: "bytes",
                    found: other.kind(),
                })
            }
        };
        if offset >= bytes.len() {
            return Ok(0);
        }
        let count = buffer.len().min(bytes.len() - offset);
        buffer[..count].copy_from_slice(&bytes[offset..offset + count]);
        Ok(count)
    }
}

fn find_ordinal(columns: &[String], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
        .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
}

fn cell<'a>(values: &'a [Value], ordinal: usize, count: usize) -> Result<&'a Value> {
    if ordinal >= count {
        return Err(DataError::OrdinalOutOfRange { ordinal, count });
    }
    values.get(ordinal).ok_or(DataError::OrdinalOutOfRange { ordinal, count: values.len() })
}

/// Materialized, forward-only result set
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// 0 = before the first row, n = positioned on row n - 1
    #[serde(skip)]
    cursor: usize,
}

impl RowSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { columns: columns.into_iter().map(Into::into).collect(), rows: Vec::new(), cursor: 0 }
    }

    /// Append a row (builder style)
    #[must_use]
    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    /// Append a row, rejecting a width that differs from the column count
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(DataError::invalid_operation(format!(
                "Row has {} values but the result set has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Move to the next row; false once the rows are exhausted
    pub fn advance(&mut self) -> bool {
        if self.cursor < self.rows.len() {
            self.cursor += 1;
            true
        } else {
            self.cursor = self.rows.len() + 1;
            false
        }
    }

    /// Values of the current row, if positioned on one
    #[must_use]
    pub fn current(&self) -> Option<&[Value]> {
        self.cursor.checked_sub(1).and_then(|i| self.rows.get(i)).map(Vec::as_slice)
    }

    /// Reposition before the first row
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Every row as a [`Record`], independent of the cursor
    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |values| RowRef { columns: &self.columns, values })
    }
}

impl Record for RowSet {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, ordinal: usize) -> Result<&str> {
        self.columns
            .get(ordinal)
            .map(String::as_str)
            .ok_or(DataError::OrdinalOutOfRange { ordinal, count: self.columns.len() })
    }

    fn ordinal(&self, name: &str) -> Result<usize> {
        find_ordinal(&self.columns, name)
    }

    fn value(&self, ordinal: usize) -> Result<&Value> {
        let row = self.current().ok_or(DataError::NoCurrentRow)?;
        cell(row, ordinal, self.columns.len())
    }
}

/// One row of a [`RowSet`]
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Record for RowRef<'_> {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, ordinal: usize) -> Result<&str> {
        self.columns
            .get(ordinal)
            .map(String::as_str)
            .ok_or(DataError::OrdinalOutOfRange { ordinal, count: self.columns.len() })
    }

    fn ordinal(&self, name: &str) -> Result<usize> {
        find_ordinal(self.columns, name)
    }

    fn value(&self, ordinal: usize) -> Result<&Value> {
        cell(self.values, ordinal, self.columns.len())
    }
}
