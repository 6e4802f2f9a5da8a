//! Per-view column filters
//!
//! A filter on a column matches the cell's rendered text exactly. There is no
//! substring, case-folding or pattern matching: `"a"` does not match `"ab"`.
//! Filters on different columns combine with AND.
//!
//! A null cell renders as `NULL`, so the literal `"NULL"` matches both null
//! cells and text cells holding that exact word.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use dbgrid_core::{NullPosition, Result, Row, TableSnapshot, Value};

use crate::sorting::compare_values;

/// Column index to the exact text a cell must render as
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    predicates: BTreeMap<usize, String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `column_index` to cells rendering as `literal`. Replaces any
    /// existing filter on that column and returns it.
    pub fn add_filter(
        &mut self,
        column_index: usize,
        literal: impl Into<String>,
    ) -> Option<String> {
        self.predicates.insert(column_index, literal.into())
    }

    /// Drop the filter on `column_index`. Returns false if there was none.
    pub fn remove_filter(&mut self, column_index: usize) -> bool {
        self.predicates.remove(&column_index).is_some()
    }

    pub fn clear(&mut self) {
        self.predicates.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn get(&self, column_index: usize) -> Option<&str> {
        self.predicates.get(&column_index).map(String::as_str)
    }

    /// Filters in column order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.predicates.iter().map(|(col, lit)| (*col, lit.as_str()))
    }

    /// True when every filter matches. A filter on a column the row does not
    /// have never matches.
    pub fn evaluate(&self, row: &Row) -> bool {
        self.predicates.iter().all(|(col, literal)| {
            row.get(*col).is_some_and(|value| cell_matches(value, literal))
        })
    }
}

fn cell_matches(value: &Value, literal: &str) -> bool {
    match value {
        Value::String(s) => s == literal,
        other => other.to_string() == literal,
    }
}

/// Distinct values of one column across the whole snapshot, ascending
pub fn unique_values(
    snapshot: &TableSnapshot,
    column_index: usize,
    null_position: NullPosition,
) -> Result<Vec<Value>> {
    snapshot.column(column_index)?;

    let mut values: Vec<Value> = snapshot
        .rows()
        .iter()
        .filter_map(|row| row.get(column_index).cloned())
        .collect();
    values.sort_by(|a, b| compare_values(a, b, null_position));
    // Same ordering as the sort, so NaN cells collapse too
    values.dedup_by(|a, b| compare_values(a, b, null_position) == Ordering::Equal);
    Ok(values)
}
