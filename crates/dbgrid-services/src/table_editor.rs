//! Write-request emitter for one open table
//!
//! Every edit is applied to the local model first, recorded in the undo log,
//! then sent to the store. The store's answer decides what happens next:
//!
//! - the expected affected count: done
//! - zero rows or an error: the local change and its undo entry are rolled
//!   back, listeners get a `WriteRejected` event, the caller gets
//!   `RemoteFailure`
//! - any other count: the local copy no longer mirrors the store, so the
//!   table is reloaded from it

use std::sync::Arc;

use async_trait::async_trait;
use dbgrid_core::{
    Column, CoreError, DeleteRequest, InsertRequest, Row, RowCriteria, Store, UpdateRequest, Value,
};
use dbgrid_table::{TableModel, UpdateSink};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{EditError, EditResult};
use crate::undo::{UndoEntry, UndoLog, UndoOperation, WriteKind};

/// How the store took an update or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The store affected exactly the rows changed locally
    Applied { rows: usize },
    /// The store affected a different number of rows; the table was reloaded
    Resynchronized { affected: u64 },
}

/// Optimistic write path for a single table
pub struct TableEditor {
    model: Arc<TableModel>,
    store: Arc<dyn Store>,
    undo: Arc<Mutex<UndoLog>>,
}

impl TableEditor {
    pub fn new(model: Arc<TableModel>, store: Arc<dyn Store>, undo: Arc<Mutex<UndoLog>>) -> Self {
        Self { model, store, undo }
    }

    pub fn table(&self) -> &str {
        self.model.name()
    }

    pub fn model(&self) -> &Arc<TableModel> {
        &self.model
    }

    /// Set `changes` on the row equal to `criteria`
    #[tracing::instrument(skip(self, criteria, changes), fields(table = %self.table()))]
    pub async fn request_update(
        &self,
        criteria: Row,
        changes: Vec<(usize, Value)>,
    ) -> EditResult<WriteOutcome> {
        if changes.is_empty() {
            return Ok(WriteOutcome::Applied { rows: 0 });
        }

        let columns = self.model.columns();
        let named = named_changes(&columns, &changes)?;

        let Some(index) = self.model.update_first_matching(&criteria, &changes)? else {
            tracing::warn!("Update criteria matched no local row");
            return Err(EditError::StaleCriteria);
        };

        let updated = apply_changes(&criteria, &changes);
        let changed_columns: Vec<usize> = changes.iter().map(|(col, _)| *col).collect();
        let undo_id = self.record(UndoOperation::Update {
            prior: criteria.clone(),
            updated: updated.clone(),
            columns: changed_columns.clone(),
            index,
        });
        let rollback = restore_changes(&criteria, &changed_columns);

        let request = UpdateRequest {
            table_name: self.table().to_string(),
            changes: named,
            criteria: RowCriteria::from_row(&columns, &criteria),
        };

        match self.store.exec_update(request).await {
            Ok(1) => Ok(WriteOutcome::Applied { rows: 1 }),
            Ok(0) => {
                self.forget(undo_id);
                self.model.update_matching_at(index, &updated, &rollback)?;
                Err(self.reject(WriteKind::Update, "no remote row matched"))
            }
            Ok(affected) => self.resync_after(WriteKind::Update, affected).await,
            Err(e) => {
                self.forget(undo_id);
                self.model.update_matching_at(index, &updated, &rollback)?;
                Err(self.reject(WriteKind::Update, &e.to_string()))
            }
        }
    }

    /// Append `row`, returning its canonical index
    #[tracing::instrument(skip(self, row), fields(table = %self.table()))]
    pub async fn request_insert(&self, row: Row) -> EditResult<usize> {
        let columns = self.model.columns();
        let index = self.model.append_row(row.clone())?;
        let undo_id = self.record(UndoOperation::Insert { row: row.clone() });

        let request = InsertRequest {
            table_name: self.table().to_string(),
            values: row.named(&columns),
        };

        match self.store.exec_insert(request).await {
            Ok(()) => Ok(index),
            Err(e) => {
                self.forget(undo_id);
                self.model.remove_last_matching(&row)?;
                Err(self.reject(WriteKind::Insert, &e.to_string()))
            }
        }
    }

    /// Delete every row equal to `criteria`. Duplicates go together, in one
    /// remote request and one undo entry.
    #[tracing::instrument(skip(self, criteria), fields(table = %self.table()))]
    pub async fn request_delete(&self, criteria: Row) -> EditResult<WriteOutcome> {
        let columns = self.model.columns();
        let removed = self.model.remove_rows_matching(&criteria)?;
        if removed.is_empty() {
            tracing::warn!("Delete criteria matched no local row");
            return Err(EditError::StaleCriteria);
        }

        let expected = removed.len();
        let undo_id = self.record(UndoOperation::Delete {
            rows: removed.clone(),
        });

        let request = DeleteRequest {
            table_name: self.table().to_string(),
            criteria: RowCriteria::from_row(&columns, &criteria),
        };

        match self.store.exec_delete(request).await {
            Ok(affected) if affected == expected as u64 => {
                Ok(WriteOutcome::Applied { rows: expected })
            }
            Ok(0) => {
                self.forget(undo_id);
                self.model.restore_rows(removed)?;
                Err(self.reject(WriteKind::Delete, "no remote row matched"))
            }
            Ok(affected) => self.resync_after(WriteKind::Delete, affected).await,
            Err(e) => {
                self.forget(undo_id);
                self.model.restore_rows(removed)?;
                Err(self.reject(WriteKind::Delete, &e.to_string()))
            }
        }
    }

    /// Reload the whole table from the store
    #[tracing::instrument(skip(self), fields(table = %self.table()))]
    pub async fn resync(&self) -> EditResult<()> {
        let data = self
            .store
            .fetch_all(self.table())
            .await
            .map_err(|e| EditError::RemoteFailure(e.to_string()))?;
        self.model.set_data(data.columns, data.rows)?;
        tracing::info!(rows = self.model.row_count(), "Table resynchronized from store");
        Ok(())
    }

    /// Reverse `entry` locally and against the store.
    ///
    /// If the store refuses, the local reversal is undone again and the entry
    /// goes back on the log. If the row the entry refers to is gone locally,
    /// the entry is dropped. An update whose target has identical copies is
    /// refused and kept.
    pub(crate) async fn undo(&self, entry: UndoEntry) -> EditResult<WriteKind> {
        let kind = entry.kind();
        tracing::debug!(id = %entry.id, %kind, table = %self.table(), "Undoing write");

        match &entry.operation {
            UndoOperation::Insert { row } => self.undo_insert(row, &entry).await?,
            UndoOperation::Update {
                prior,
                updated,
                columns,
                index,
            } => self.undo_update(prior, updated, columns, *index, &entry).await?,
            UndoOperation::Delete { rows } => self.undo_delete(rows, &entry).await?,
            // Dropping a table needs the session; see `BrowserSession::undo_last`
            UndoOperation::CreateTable { .. } => {
                return Err(EditError::TableNotOpen(self.table().to_string()));
            }
        }
        Ok(kind)
    }

    async fn undo_insert(&self, row: &Row, entry: &UndoEntry) -> EditResult<()> {
        let Some(index) = self.model.remove_last_matching(row)? else {
            return Err(self.stale(entry));
        };

        let request = DeleteRequest {
            table_name: self.table().to_string(),
            criteria: RowCriteria::from_row(&self.model.columns(), row),
        };
        match self.store.exec_delete(request).await {
            Ok(1) => Ok(()),
            Ok(0) => {
                self.model.restore_rows(vec![(index, row.clone())])?;
                Err(self.requeue(entry, "no remote row matched"))
            }
            // Exact-match delete also took the inserted row's duplicates
            Ok(affected) => self.reinsert_duplicates(row, affected - 1).await,
            Err(e) => {
                self.model.restore_rows(vec![(index, row.clone())])?;
                Err(self.requeue(entry, &e.to_string()))
            }
        }
    }

    async fn undo_update(
        &self,
        prior: &Row,
        updated: &Row,
        columns: &[usize],
        index: usize,
        entry: &UndoEntry,
    ) -> EditResult<()> {
        // The store can only address the row by value
        let matches = self.model.count_matching(updated);
        if matches > 1 {
            tracing::warn!(id = %entry.id, matches, "Undo target is not unique, keeping entry");
            self.undo.lock().push(entry.clone());
            return Err(EditError::AmbiguousCriteria { matches });
        }

        let back = restore_changes(prior, columns);
        let forward = restore_changes(updated, columns);
        let Some(at) = self.model.update_matching_at(index, updated, &back)? else {
            return Err(self.stale(entry));
        };

        let schema = self.model.columns();
        let request = UpdateRequest {
            table_name: self.table().to_string(),
            changes: named_changes(&schema, &back)?,
            criteria: RowCriteria::from_row(&schema, updated),
        };
        match self.store.exec_update(request).await {
            Ok(1) => Ok(()),
            Ok(0) => {
                self.model.update_matching_at(at, prior, &forward)?;
                Err(self.requeue(entry, "no remote row matched"))
            }
            Ok(affected) => self.resync_after(WriteKind::Update, affected).await.map(|_| ()),
            Err(e) => {
                self.model.update_matching_at(at, prior, &forward)?;
                Err(self.requeue(entry, &e.to_string()))
            }
        }
    }

    async fn undo_delete(&self, rows: &[(usize, Row)], entry: &UndoEntry) -> EditResult<()> {
        self.model.restore_rows(rows.to_vec())?;

        let schema = self.model.columns();
        for (inserted, (_, row)) in rows.iter().enumerate() {
            let request = InsertRequest {
                table_name: self.table().to_string(),
                values: row.named(&schema),
            };
            if let Err(e) = self.store.exec_insert(request).await {
                if inserted == 0 {
                    for (_, row) in rows {
                        self.model.remove_last_matching(row)?;
                    }
                    return Err(self.requeue(entry, &e.to_string()));
                }
                // Some rows are back remotely; only the store knows the truth
                tracing::warn!(
                    inserted,
                    total = rows.len(),
                    error = %e,
                    "Partial re-insert while undoing delete"
                );
                self.resync().await?;
                return Err(self.reject(WriteKind::Delete, &e.to_string()));
            }
        }
        Ok(())
    }

    /// Put back `count` copies of `row` that an exact-match delete removed
    /// remotely although they were not part of the write being undone
    async fn reinsert_duplicates(&self, row: &Row, count: u64) -> EditResult<()> {
        tracing::warn!(count, "Undo delete also matched duplicate rows, re-inserting them");
        let columns = self.model.columns();
        for _ in 0..count {
            let request = InsertRequest {
                table_name: self.table().to_string(),
                values: row.named(&columns),
            };
            if let Err(e) = self.store.exec_insert(request).await {
                self.resync().await?;
                return Err(self.reject(WriteKind::Insert, &e.to_string()));
            }
        }
        Ok(())
    }

    async fn resync_after(&self, kind: WriteKind, affected: u64) -> EditResult<WriteOutcome> {
        tracing::warn!(%kind, affected, "Store affected an unexpected number of rows, reloading");
        self.resync().await?;
        Ok(WriteOutcome::Resynchronized { affected })
    }

    fn record(&self, operation: UndoOperation) -> Uuid {
        let entry = UndoEntry::new(self.table(), operation);
        let id = entry.id;
        self.undo.lock().push(entry);
        id
    }

    fn forget(&self, id: Uuid) {
        self.undo.lock().take(id);
    }

    /// Put an entry whose reversal the store refused back on the log
    fn requeue(&self, entry: &UndoEntry, message: &str) -> EditError {
        self.undo.lock().push(entry.clone());
        self.reject(entry.kind(), message)
    }

    fn stale(&self, entry: &UndoEntry) -> EditError {
        tracing::warn!(
            id = %entry.id,
            kind = %entry.kind(),
            "Undo target no longer present, dropping entry"
        );
        EditError::StaleCriteria
    }

    fn reject(&self, kind: WriteKind, message: &str) -> EditError {
        tracing::warn!(%kind, error = message, "Store rejected write, local change rolled back");
        if let Err(e) = self.model.report_write_rejected(&kind.to_string(), message) {
            tracing::warn!(error = %e, "Could not publish write rejection");
        }
        EditError::RemoteFailure(message.to_string())
    }
}

#[async_trait]
impl UpdateSink for TableEditor {
    type Error = EditError;

    async fn request_update(
        &self,
        criteria: Row,
        changes: Vec<(usize, Value)>,
    ) -> Result<(), EditError> {
        TableEditor::request_update(self, criteria, changes)
            .await
            .map(|_| ())
    }
}

impl std::fmt::Debug for TableEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableEditor")
            .field("table", &self.table())
            .field("store", &self.store.store_name())
            .finish()
    }
}

fn named_changes(
    columns: &[Column],
    changes: &[(usize, Value)],
) -> Result<Vec<(String, Value)>, CoreError> {
    changes
        .iter()
        .map(|(col, value)| {
            let column = columns.get(*col).ok_or(CoreError::IndexOutOfRange {
                index: *col,
                len: columns.len(),
            })?;
            Ok((column.name.clone(), value.clone()))
        })
        .collect()
}

fn apply_changes(row: &Row, changes: &[(usize, Value)]) -> Row {
    let mut row = row.clone();
    for (col, value) in changes {
        if let Some(cell) = row.values.get_mut(*col) {
            *cell = value.clone();
        }
    }
    row
}

/// The `(column, value)` pairs that put `columns` back to what `source` holds
fn restore_changes(source: &Row, columns: &[usize]) -> Vec<(usize, Value)> {
    columns
        .iter()
        .filter_map(|col| source.get(*col).map(|value| (*col, value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgrid_core::ColumnType;
    use pretty_assertions::assert_eq;

    fn row(id: i32, name: &str) -> Row {
        Row::new(vec![Value::Int32(id), Value::from(name)])
    }

    #[test]
    fn test_apply_and_restore_changes() {
        let before = row(1, "a");
        let after = apply_changes(&before, &[(1, Value::from("b"))]);
        assert_eq!(after, row(1, "b"));
        assert_eq!(restore_changes(&before, &[1]), vec![(1, Value::from("a"))]);
    }

    #[test]
    fn test_named_changes_rejects_unknown_column() {
        let columns = vec![Column::new("id", ColumnType::Integer)];
        assert!(matches!(
            named_changes(&columns, &[(3, Value::Int32(1))]),
            Err(CoreError::IndexOutOfRange { index: 3, len: 1 })
        ));
    }
}
