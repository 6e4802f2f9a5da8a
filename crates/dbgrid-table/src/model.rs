//! Table model
//!
//! Owns the canonical snapshot of one table. All mutation goes through
//! [`TableModel::mutate`], which:
//!
//! 1. takes the mutation gate, serializing mutations across threads,
//! 2. validates and applies the change under the snapshot write lock,
//! 3. releases the write lock and publishes exactly one [`ChangeEvent`].
//!
//! The gate is re-entrant so that a listener calling back into the model on
//! the delivering thread gets `ReentrantMutation` instead of a deadlock.

use std::cell::Cell;
use std::sync::Arc;

use dbgrid_core::{Column, CoreError, Result, Row, TableSnapshot, Value};
use parking_lot::{ReentrantMutex, RwLock};

use crate::bus::{ChangeBus, ChangeEvent, ChangeKind, ChangeListener, SubscriptionId};

struct ModelState {
    snapshot: Arc<TableSnapshot>,
    revision: u64,
}

/// Resets the delivery flag even if a listener panics
struct DeliveryGuard<'a>(&'a Cell<bool>);

impl<'a> DeliveryGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Canonical in-memory copy of a database table
pub struct TableModel {
    name: String,
    state: RwLock<ModelState>,
    /// `true` while change events are being delivered
    gate: ReentrantMutex<Cell<bool>>,
    bus: ChangeBus,
}

impl TableModel {
    /// Create a model from validated columns and rows
    pub fn new(name: impl Into<String>, columns: Vec<Column>, rows: Vec<Row>) -> Result<Self> {
        let snapshot = TableSnapshot::new(columns, rows)?;
        Ok(Self {
            name: name.into(),
            state: RwLock::new(ModelState {
                snapshot: Arc::new(snapshot),
                revision: 0,
            }),
            gate: ReentrantMutex::new(Cell::new(false)),
            bus: ChangeBus::new(),
        })
    }

    /// Create a model with no columns and no rows
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ModelState {
                snapshot: Arc::new(TableSnapshot::empty()),
                revision: 0,
            }),
            gate: ReentrantMutex::new(Cell::new(false)),
            bus: ChangeBus::new(),
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current snapshot. Cheap; shares the model's copy.
    pub fn snapshot(&self) -> Arc<TableSnapshot> {
        Arc::clone(&self.state.read().snapshot)
    }

    /// Current snapshot together with the revision it belongs to
    pub fn snapshot_with_revision(&self) -> (Arc<TableSnapshot>, u64) {
        let state = self.state.read();
        (Arc::clone(&state.snapshot), state.revision)
    }

    /// Monotonic counter, bumped once per successful mutation
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    pub fn row_count(&self) -> usize {
        self.state.read().snapshot.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.state.read().snapshot.column_count()
    }

    pub fn columns(&self) -> Vec<Column> {
        self.state.read().snapshot.columns().to_vec()
    }

    /// Row at canonical position `index`
    pub fn get_row(&self, index: usize) -> Result<Row> {
        self.state.read().snapshot.row(index).cloned()
    }

    /// Canonical index of the first row equal to `row`
    pub fn position_of(&self, row: &Row) -> Option<usize> {
        self.state.read().snapshot.position_of(row)
    }

    pub fn subscribe<L>(&self, listener: &Arc<L>) -> SubscriptionId
    where
        L: ChangeListener + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn clear_subscribers(&self) {
        self.bus.clear()
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// Replace columns and rows. Every row is validated against the new
    /// columns first; on `SchemaMismatch` nothing changes.
    pub fn set_data(&self, columns: Vec<Column>, rows: Vec<Row>) -> Result<()> {
        let replacement = TableSnapshot::new(columns, rows)?;
        let row_count = replacement.row_count();
        self.mutate(move |snapshot| {
            *snapshot = replacement;
            Ok(((), Some(ChangeKind::Replaced)))
        })?;
        tracing::debug!(table = %self.name, rows = row_count, "Table data replaced");
        Ok(())
    }

    /// Replace one cell, returning the full row as it was before
    pub fn set_cell(&self, row_index: usize, col_index: usize, value: Value) -> Result<Row> {
        self.update_row(row_index, &[(col_index, value)])
    }

    /// Replace several cells of one row in a single notification, returning
    /// the full row as it was before
    pub fn update_row(&self, row_index: usize, changes: &[(usize, Value)]) -> Result<Row> {
        self.mutate(|snapshot| {
            let prior = snapshot.update_cells(row_index, changes)?;
            Ok((prior, Some(ChangeKind::RowUpdated { index: row_index })))
        })
    }

    /// Apply `changes` to the first row equal to `criteria`.
    ///
    /// Lookup and update happen under one mutation, so no other writer can
    /// move the row in between. Returns `None` (and publishes nothing) when
    /// no row matches.
    pub fn update_first_matching(
        &self,
        criteria: &Row,
        changes: &[(usize, Value)],
    ) -> Result<Option<usize>> {
        self.mutate(|snapshot| match snapshot.position_of(criteria) {
            Some(index) => {
                snapshot.update_cells(index, changes)?;
                Ok((Some(index), Some(ChangeKind::RowUpdated { index })))
            }
            None => Ok((None, None)),
        })
    }

    /// Apply `changes` to the row equal to `expected`, preferring the one at
    /// `index`. Falls back to the first equal row when `index` no longer holds
    /// it. Returns `None` (and publishes nothing) when no row matches.
    pub fn update_matching_at(
        &self,
        index: usize,
        expected: &Row,
        changes: &[(usize, Value)],
    ) -> Result<Option<usize>> {
        self.mutate(|snapshot| {
            let target = match snapshot.row(index) {
                Ok(row) if row == expected => Some(index),
                _ => snapshot.position_of(expected),
            };
            match target {
                Some(index) => {
                    snapshot.update_cells(index, changes)?;
                    Ok((Some(index), Some(ChangeKind::RowUpdated { index })))
                }
                None => Ok((None, None)),
            }
        })
    }

    /// Number of rows structurally equal to `row`
    pub fn count_matching(&self, row: &Row) -> usize {
        self.state
            .read()
            .snapshot
            .rows()
            .iter()
            .filter(|r| *r == row)
            .count()
    }

    /// Append a row, returning its canonical index
    pub fn append_row(&self, row: Row) -> Result<usize> {
        self.mutate(|snapshot| {
            let index = snapshot.push(row)?;
            Ok((index, Some(ChangeKind::RowAppended { index })))
        })
    }

    /// Put rows back at the positions they were removed from
    pub fn restore_rows(&self, rows: Vec<(usize, Row)>) -> Result<Vec<usize>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.mutate(|snapshot| {
            let indices = snapshot.insert_rows(rows)?;
            let kind = ChangeKind::RowsInserted {
                indices: indices.clone(),
            };
            Ok((indices, Some(kind)))
        })
    }

    /// Remove every row structurally equal to `criteria`.
    ///
    /// Returns the removed rows with their former canonical indices. Nothing
    /// is published when no row matches.
    pub fn remove_rows_matching(&self, criteria: &Row) -> Result<Vec<(usize, Row)>> {
        self.mutate(|snapshot| {
            let removed = snapshot.remove_matching(criteria);
            if removed.is_empty() {
                return Ok((removed, None));
            }
            let indices = removed.iter().map(|(index, _)| *index).collect();
            Ok((removed, Some(ChangeKind::RowsRemoved { indices })))
        })
    }

    /// Remove the last row equal to `criteria`, leaving any duplicates
    pub fn remove_last_matching(&self, criteria: &Row) -> Result<Option<usize>> {
        self.mutate(|snapshot| match snapshot.remove_last_matching(criteria) {
            Some(index) => Ok((
                Some(index),
                Some(ChangeKind::RowsRemoved {
                    indices: vec![index],
                }),
            )),
            None => Ok((None, None)),
        })
    }

    /// Tell listeners a remote write was rejected. The snapshot and revision
    /// are unchanged.
    pub fn report_write_rejected(&self, operation: &str, message: &str) -> Result<()> {
        let gate = self.gate.lock();
        if gate.get() {
            return Err(CoreError::ReentrantMutation);
        }

        let (snapshot, revision) = self.snapshot_with_revision();
        let event = ChangeEvent {
            revision,
            kind: ChangeKind::WriteRejected {
                operation: operation.to_string(),
                message: message.to_string(),
            },
            snapshot,
        };

        let _delivering = DeliveryGuard::enter(&gate);
        self.bus.publish(&event);
        Ok(())
    }

    /// Run `op` against the snapshot and publish the resulting change.
    ///
    /// `op` returns the caller's value plus the change it made, or `None` when
    /// it made no change (no revision bump, no event). `op` must leave the
    /// snapshot untouched when it returns an error.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut TableSnapshot) -> Result<(T, Option<ChangeKind>)>,
    ) -> Result<T> {
        let gate = self.gate.lock();
        if gate.get() {
            tracing::warn!(table = %self.name, "Rejected mutation from inside a change listener");
            return Err(CoreError::ReentrantMutation);
        }

        let (value, event) = {
            let mut state = self.state.write();
            let (value, kind) = op(Arc::make_mut(&mut state.snapshot))?;
            let event = kind.map(|kind| {
                state.revision += 1;
                ChangeEvent {
                    revision: state.revision,
                    kind,
                    snapshot: Arc::clone(&state.snapshot),
                }
            });
            (value, event)
        };

        if let Some(event) = event {
            let _delivering = DeliveryGuard::enter(&gate);
            self.bus.publish(&event);
        }
        Ok(value)
    }
}

impl std::fmt::Debug for TableModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("TableModel")
            .field("name", &self.name)
            .field("revision", &state.revision)
            .field("rows", &state.snapshot.row_count())
            .field("columns", &state.snapshot.column_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgrid_core::ColumnType;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn row(id: i32, name: &str) -> Row {
        Row::new(vec![Value::Int32(id), Value::from(name)])
    }

    fn model() -> TableModel {
        TableModel::new(
            "users",
            vec![
                Column::new("id", ColumnType::Integer),
                Column::new("name", ColumnType::VarText),
            ],
            vec![row(1, "a"), row(2, "b")],
        )
        .unwrap()
    }

    type Recorder = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

    fn recorder(model: &TableModel) -> (Arc<Recorder>, Arc<Mutex<Vec<ChangeKind>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let callback: Recorder = {
            let seen = seen.clone();
            Box::new(move |event: &ChangeEvent| {
                seen.lock().unwrap().push(event.kind.clone());
            })
        };
        let listener = Arc::new(callback);
        model.subscribe(&listener);
        (listener, seen)
    }

    #[test]
    fn test_get_row_bounds() {
        let model = model();
        assert_eq!(model.get_row(1).unwrap(), row(2, "b"));
        assert!(matches!(
            model.get_row(2),
            Err(CoreError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_set_cell_returns_prior_row_and_notifies_once() {
        let model = model();
        let (_listener, seen) = recorder(&model);

        let prior = model.set_cell(1, 1, Value::from("B")).unwrap();
        assert_eq!(prior, row(2, "b"));
        assert_eq!(model.get_row(1).unwrap(), row(2, "B"));
        assert_eq!(model.revision(), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeKind::RowUpdated { index: 1 }]
        );
    }

    #[test]
    fn test_set_cell_type_mismatch_leaves_model_untouched() {
        let model = model();
        let (_listener, seen) = recorder(&model);

        let err = model.set_cell(0, 0, Value::from("one")).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
        assert_eq!(model.get_row(0).unwrap(), row(1, "a"));
        assert_eq!(model.revision(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_data_rejects_mismatch_without_partial_commit() {
        let model = model();
        let err = model
            .set_data(
                vec![Column::new("id", ColumnType::Integer)],
                vec![Row::new(vec![Value::Int32(9)]), row(3, "c")],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::SchemaMismatch(_)));
        assert_eq!(model.column_count(), 2);
        assert_eq!(model.row_count(), 2);
    }

    #[test]
    fn test_remove_rows_matching_counts_all_duplicates() {
        let model = model();
        model.append_row(row(1, "a")).unwrap();
        let (_listener, seen) = recorder(&model);

        let removed = model.remove_rows_matching(&row(1, "a")).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(model.row_count(), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeKind::RowsRemoved {
                indices: vec![0, 2]
            }]
        );

        assert!(model.remove_rows_matching(&row(7, "z")).unwrap().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1, "no event for a no-op removal");
    }

    #[test]
    fn test_update_matching_at_prefers_the_given_index() {
        let model = model();
        model.append_row(row(1, "a")).unwrap();
        let (_listener, seen) = recorder(&model);

        // Rows 0 and 2 are equal; the one at index 2 is the target
        let updated = model
            .update_matching_at(2, &row(1, "a"), &[(1, Value::from("z"))])
            .unwrap();
        assert_eq!(updated, Some(2));
        assert_eq!(
            model.snapshot().rows(),
            &[row(1, "a"), row(2, "b"), row(1, "z")]
        );
        assert_eq!(model.count_matching(&row(1, "a")), 1);

        // Index 1 no longer holds the row, so the first equal row is used
        let fallback = model
            .update_matching_at(1, &row(1, "z"), &[(1, Value::from("y"))])
            .unwrap();
        assert_eq!(fallback, Some(2));
        assert_eq!(
            model
                .update_matching_at(0, &row(9, "q"), &[(1, Value::from("y"))])
                .unwrap(),
            None
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ChangeKind::RowUpdated { index: 2 },
                ChangeKind::RowUpdated { index: 2 }
            ]
        );
    }

    #[test]
    fn test_reentrant_mutation_fails_fast() {
        let model = Arc::new(model());
        let outcome = Arc::new(Mutex::new(None));

        let listener = {
            let weak = Arc::downgrade(&model);
            let outcome = outcome.clone();
            Arc::new(move |_: &ChangeEvent| {
                if let Some(model) = weak.upgrade() {
                    let result = model.append_row(row(9, "z"));
                    *outcome.lock().unwrap() = Some(result.is_err());
                }
            })
        };
        model.subscribe(&listener);

        model.append_row(row(3, "c")).unwrap();
        assert_eq!(*outcome.lock().unwrap(), Some(true));
        assert_eq!(model.row_count(), 3, "nested append must not land");

        // The gate is released after delivery
        model.clear_subscribers();
        model.append_row(row(4, "d")).unwrap();
        assert_eq!(model.row_count(), 4);
    }

    #[test]
    fn test_event_snapshot_reflects_mutation() {
        let model = model();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let listener = {
            let counts = counts.clone();
            Arc::new(move |event: &ChangeEvent| {
                counts.lock().unwrap().push(event.snapshot.row_count());
            })
        };
        model.subscribe(&listener);

        model.append_row(row(3, "c")).unwrap();
        model.remove_rows_matching(&row(1, "a")).unwrap();
        assert_eq!(*counts.lock().unwrap(), vec![3, 2]);
    }

    #[test]
    fn test_write_rejected_keeps_revision() {
        let model = model();
        let (_listener, seen) = recorder(&model);

        model.report_write_rejected("update", "boom").unwrap();
        assert_eq!(model.revision(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeKind::WriteRejected {
                operation: "update".to_string(),
                message: "boom".to_string()
            }]
        );
    }
}
