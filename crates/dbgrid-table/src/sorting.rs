//! Multi-column sorting for views
//!
//! Sorting is view-local: a view sorts its list of canonical row indices and
//! never reorders the model's rows.

use std::cmp::Ordering;

use dbgrid_core::{NullPosition, Row, Value};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    pub fn toggle(&self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// A column to sort by with its index and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortColumn {
    /// Column index in the row
    pub column_index: usize,
    pub direction: SortDirection,
}

impl SortColumn {
    pub fn new(column_index: usize, direction: SortDirection) -> Self {
        Self {
            column_index,
            direction,
        }
    }

    pub fn ascending(column_index: usize) -> Self {
        Self::new(column_index, SortDirection::Ascending)
    }

    pub fn descending(column_index: usize) -> Self {
        Self::new(column_index, SortDirection::Descending)
    }
}

/// Multi-column sort configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiColumnSort {
    /// Columns to sort by, in priority order (first = highest priority)
    columns: Vec<SortColumn>,
    null_position: NullPosition,
}

impl MultiColumnSort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_null_position(null_position: NullPosition) -> Self {
        Self {
            columns: Vec::new(),
            null_position,
        }
    }

    /// Sort by `column`. A column already in the sort keeps its priority and
    /// takes the new direction; otherwise it becomes the lowest priority.
    pub fn set_column(&mut self, column: SortColumn) {
        match self
            .columns
            .iter_mut()
            .find(|c| c.column_index == column.column_index)
        {
            Some(existing) => existing.direction = column.direction,
            None => self.columns.push(column),
        }
    }

    pub fn add_ascending(&mut self, column_index: usize) {
        self.set_column(SortColumn::ascending(column_index));
    }

    pub fn add_descending(&mut self, column_index: usize) {
        self.set_column(SortColumn::descending(column_index));
    }

    /// Stop sorting by `column_index`. Returns false if it was not sorted.
    pub fn remove_column(&mut self, column_index: usize) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.column_index != column_index);
        self.columns.len() != before
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[SortColumn] {
        &self.columns
    }

    pub fn null_position(&self) -> NullPosition {
        self.null_position
    }

    pub fn set_null_position(&mut self, position: NullPosition) {
        self.null_position = position;
    }

    /// Compare two rows using all configured sort columns
    pub fn compare_rows(&self, row_a: &Row, row_b: &Row) -> Ordering {
        for sort_col in &self.columns {
            let a = row_a.get(sort_col.column_index);
            let b = row_b.get(sort_col.column_index);

            let ordering = match (a, b) {
                (Some(va), Some(vb)) => compare_values(va, vb, self.null_position),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };

            if ordering != Ordering::Equal {
                return match sort_col.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
            }
        }
        Ordering::Equal
    }

    /// Stable-sort a list of indices into `rows`. Ties keep their incoming
    /// (canonical) order.
    pub fn sort_indices(&self, indices: &mut [usize], rows: &[Row]) {
        if self.is_empty() {
            return;
        }
        indices.sort_by(|a, b| self.compare_rows(&rows[*a], &rows[*b]));
    }
}

/// Natural ordering of two cell values with NULL placement
pub fn compare_values(a: &Value, b: &Value, null_position: NullPosition) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => match null_position {
            NullPosition::First => Ordering::Less,
            NullPosition::Last => Ordering::Greater,
        },
        (false, true) => match null_position {
            NullPosition::First => Ordering::Greater,
            NullPosition::Last => Ordering::Less,
        },
        (false, false) => compare_non_null_values(a, b),
    }
}

fn compare_non_null_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),

        (Value::Int16(a), Value::Int16(b)) => a.cmp(b),
        (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
        (Value::Int64(a), Value::Int64(b)) => a.cmp(b),

        // NaN sorts after every number
        (Value::Float32(a), Value::Float32(b)) => a.total_cmp(b),
        (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),

        (Value::String(a), Value::String(b)) => a.cmp(b),

        (a, b) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                // Fallback: compare rendered text
                _ => a.to_string().cmp(&b.to_string()),
            },
        },
    }
}
