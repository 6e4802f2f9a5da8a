//! Canonical table snapshot
//!
//! `TableSnapshot` is the one place rows live. Every mutating method validates
//! its input before touching any state, so a snapshot is schema-valid at all
//! times: every row has one cell per column and each cell is accepted by its
//! column's declared type.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Column, CoreError, Result, Row, Value};

/// Ordered columns plus ordered rows of a single table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableSnapshot {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl TableSnapshot {
    /// Build a snapshot, rejecting it whole if any row disagrees with `columns`
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(CoreError::SchemaMismatch(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        for (index, row) in rows.iter().enumerate() {
            validate_row(&columns, row).map_err(|e| match e {
                CoreError::TypeMismatch {
                    column,
                    expected,
                    found,
                } => CoreError::SchemaMismatch(format!(
                    "row {}: column '{}' expects {}, found {}",
                    index, column, expected, found
                )),
                CoreError::SchemaMismatch(msg) => {
                    CoreError::SchemaMismatch(format!("row {}: {}", index, msg))
                }
                other => other,
            })?;
        }

        Ok(Self { columns, rows })
    }

    /// A snapshot with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Index of the column called `name`
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, index: usize) -> Result<&Column> {
        self.columns.get(index).ok_or(CoreError::IndexOutOfRange {
            index,
            len: self.columns.len(),
        })
    }

    pub fn row(&self, index: usize) -> Result<&Row> {
        self.rows.get(index).ok_or(CoreError::IndexOutOfRange {
            index,
            len: self.rows.len(),
        })
    }

    /// Check a row against this snapshot's columns
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        validate_row(&self.columns, row)
    }

    /// Canonical index of the first row structurally equal to `row`
    pub fn position_of(&self, row: &Row) -> Option<usize> {
        self.rows.iter().position(|r| r == row)
    }

    /// Replace several cells of one row. All changes are type-checked before
    /// any is applied. Returns the full row as it was before the change.
    pub fn update_cells(&mut self, index: usize, changes: &[(usize, Value)]) -> Result<Row> {
        let len = self.rows.len();
        if index >= len {
            return Err(CoreError::IndexOutOfRange { index, len });
        }

        for (col, value) in changes {
            self.column(*col)?.check(value)?;
        }

        let row = &mut self.rows[index];
        let prior = row.clone();
        for (col, value) in changes {
            row.values[*col] = value.clone();
        }
        Ok(prior)
    }

    /// Append a row, returning its canonical index
    pub fn push(&mut self, row: Row) -> Result<usize> {
        self.validate_row(&row)?;
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    /// Insert rows at the given final positions.
    ///
    /// Entries are applied in ascending index order; an index past the end
    /// appends. Returns the positions the rows actually landed at.
    pub fn insert_rows(&mut self, mut rows: Vec<(usize, Row)>) -> Result<Vec<usize>> {
        for (_, row) in &rows {
            self.validate_row(row)?;
        }

        rows.sort_by_key(|(index, _)| *index);
        let mut landed = Vec::with_capacity(rows.len());
        for (index, row) in rows {
            let at = index.min(self.rows.len());
            self.rows.insert(at, row);
            landed.push(at);
        }
        Ok(landed)
    }

    /// Remove every row structurally equal to `criteria`, returning the
    /// removed rows with their pre-removal indices (ascending)
    pub fn remove_matching(&mut self, criteria: &Row) -> Vec<(usize, Row)> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.rows.len());
        for (index, row) in std::mem::take(&mut self.rows).into_iter().enumerate() {
            if &row == criteria {
                removed.push((index, row));
            } else {
                kept.push(row);
            }
        }
        self.rows = kept;
        removed
    }

    /// Remove only the last row equal to `criteria`
    pub fn remove_last_matching(&mut self, criteria: &Row) -> Option<usize> {
        let index = self.rows.iter().rposition(|r| r == criteria)?;
        self.rows.remove(index);
        Some(index)
    }
}

fn validate_row(columns: &[Column], row: &Row) -> Result<()> {
    if row.len() != columns.len() {
        return Err(CoreError::SchemaMismatch(format!(
            "row has {} values but table has {} columns",
            row.len(),
            columns.len()
        )));
    }
    for (column, value) in columns.iter().zip(row.values.iter()) {
        column.check(value)?;
    }
    Ok(())
}
