//! View binding
//!
//! A `ViewBinding` is one grid's projection of a shared [`TableModel`]: its
//! own filters, sort and selection over the model's rows, held as a list of
//! canonical row indices. It never copies row data.
//!
//! The view subscribes to the model's bus and rebuilds its index mapping on
//! every change, so reads see the mapping for the model's latest revision.
//! A view that has been detached falls behind and reports `StaleIndex`.

use std::sync::Arc;

use async_trait::async_trait;
use dbgrid_core::{CoreError, NullPosition, Result, Row, TableSnapshot, Value};
use parking_lot::Mutex;

use crate::bus::{ChangeEvent, ChangeKind, ChangeListener, SubscriptionId};
use crate::filter::{FilterSet, unique_values};
use crate::model::TableModel;
use crate::sorting::{MultiColumnSort, SortColumn, SortDirection};

/// The selected cell, tracked by canonical row so it survives re-sorting and
/// refiltering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub canonical_row: usize,
    pub view_row: usize,
    pub column: usize,
}

/// Result of committing a cell edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The new value equals the current one; nothing was sent
    Unchanged,
    /// The change was handed to the sink and accepted
    Submitted,
}

/// Where a view sends cell edits. Implemented by the write-request emitter.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    type Error: From<CoreError> + Send;

    /// Update the row equal to `criteria`, setting each `(column, value)`
    async fn request_update(
        &self,
        criteria: Row,
        changes: Vec<(usize, Value)>,
    ) -> std::result::Result<(), Self::Error>;
}

struct ViewState {
    filters: FilterSet,
    sort: MultiColumnSort,
    /// The model snapshot `index` maps into, shared with the model
    snapshot: Arc<TableSnapshot>,
    /// Revision of `snapshot`
    mapped_revision: u64,
    /// View row -> canonical row
    index: Vec<usize>,
    selection: Option<Selection>,
}

impl ViewState {
    /// Move to a newer snapshot and rebuild the mapping
    fn remap(&mut self, snapshot: Arc<TableSnapshot>, revision: u64) {
        self.snapshot = snapshot;
        self.mapped_revision = revision;
        self.rebuild();
    }

    /// Re-run filters and sort over the held snapshot
    fn rebuild(&mut self) {
        let rows = self.snapshot.rows();
        let mut index: Vec<usize> = (0..rows.len())
            .filter(|i| self.filters.evaluate(&rows[*i]))
            .collect();
        self.sort.sort_indices(&mut index, rows);

        self.index = index;
        self.relocate_selection();
    }

    /// Find the selected canonical row in the current mapping, or drop the
    /// selection if it is no longer visible
    fn relocate_selection(&mut self) {
        self.selection = self.selection.and_then(|selection| {
            self.index
                .iter()
                .position(|c| *c == selection.canonical_row)
                .map(|view_row| Selection {
                    view_row,
                    ..selection
                })
        });
    }

    fn canonical(&self, view_row: usize, current_revision: u64) -> Result<usize> {
        if self.mapped_revision != current_revision {
            return Err(CoreError::StaleIndex {
                mapped: self.mapped_revision,
                current: current_revision,
            });
        }
        self.index
            .get(view_row)
            .copied()
            .ok_or(CoreError::IndexOutOfRange {
                index: view_row,
                len: self.index.len(),
            })
    }
}

/// Where the canonical row `row` ends up after `kind`, or `None` if it is gone
fn shift_canonical(row: usize, kind: &ChangeKind, row_count: usize) -> Option<usize> {
    match kind {
        ChangeKind::Replaced => (row < row_count).then_some(row),
        ChangeKind::RowUpdated { .. }
        | ChangeKind::RowAppended { .. }
        | ChangeKind::WriteRejected { .. } => Some(row),
        ChangeKind::RowsInserted { indices } => {
            let mut row = row;
            for inserted in indices {
                if *inserted <= row {
                    row += 1;
                }
            }
            Some(row)
        }
        ChangeKind::RowsRemoved { indices } => {
            if indices.contains(&row) {
                None
            } else {
                Some(row - indices.iter().filter(|i| **i < row).count())
            }
        }
    }
}

/// One grid's filtered, sorted projection of a shared model
pub struct ViewBinding {
    model: Arc<TableModel>,
    subscription: Mutex<Option<SubscriptionId>>,
    state: Mutex<ViewState>,
}

impl ViewBinding {
    /// Bind a new view to `model` with no filters and canonical order
    pub fn attach(model: Arc<TableModel>, null_position: NullPosition) -> Arc<Self> {
        let view = Arc::new(Self {
            model,
            subscription: Mutex::new(None),
            state: Mutex::new(ViewState {
                filters: FilterSet::new(),
                sort: MultiColumnSort::with_null_position(null_position),
                snapshot: Arc::new(TableSnapshot::empty()),
                mapped_revision: 0,
                index: Vec::new(),
                selection: None,
            }),
        });

        {
            // Events racing the subscription wait on this lock and are
            // skipped if the snapshot below already covers them
            let mut state = view.state.lock();
            let id = view.model.subscribe(&view);
            *view.subscription.lock() = Some(id);
            let (snapshot, revision) = view.model.snapshot_with_revision();
            state.remap(snapshot, revision);
        }

        tracing::debug!(table = %view.model.name(), "View attached");
        view
    }

    pub fn model(&self) -> &Arc<TableModel> {
        &self.model
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Number of rows passing this view's filters
    pub fn visible_row_count(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Canonical index of the row shown at `view_row`
    pub fn view_index_to_canonical(&self, view_row: usize) -> Result<usize> {
        let state = self.state.lock();
        state.canonical(view_row, self.model.revision())
    }

    /// Row shown at `view_row`
    pub fn row_at(&self, view_row: usize) -> Result<Row> {
        let state = self.state.lock();
        let canonical = state.canonical(view_row, self.model.revision())?;
        state.snapshot.row(canonical).cloned()
    }

    /// Rows in view order
    pub fn visible_rows(&self) -> Result<Vec<Row>> {
        let state = self.state.lock();
        let current = self.model.revision();
        if state.mapped_revision != current {
            return Err(CoreError::StaleIndex {
                mapped: state.mapped_revision,
                current,
            });
        }
        state
            .index
            .iter()
            .map(|i| state.snapshot.row(*i).cloned())
            .collect()
    }

    /// Show only rows whose cell in `column_index` renders exactly as
    /// `literal`. Replaces any filter already on that column.
    pub fn add_filter(&self, column_index: usize, literal: impl Into<String>) -> Result<()> {
        let column_count = self.model.column_count();
        if column_index >= column_count {
            return Err(CoreError::IndexOutOfRange {
                index: column_index,
                len: column_count,
            });
        }

        let literal = literal.into();
        tracing::debug!(
            table = %self.model.name(),
            column = column_index,
            %literal,
            "Filter added"
        );
        self.update_state(|state| {
            state.filters.add_filter(column_index, literal);
        });
        Ok(())
    }

    /// Remove the filter on `column_index`; a no-op if there is none
    pub fn remove_filter(&self, column_index: usize) {
        self.update_state(|state| {
            state.filters.remove_filter(column_index);
        });
    }

    pub fn clear_filters(&self) {
        self.update_state(|state| state.filters.clear());
    }

    pub fn filters(&self) -> FilterSet {
        self.state.lock().filters.clone()
    }

    /// Add or re-direct a sort column. Columns sorted earlier take priority.
    pub fn sort_by(&self, column_index: usize, direction: SortDirection) -> Result<()> {
        let column_count = self.model.column_count();
        if column_index >= column_count {
            return Err(CoreError::IndexOutOfRange {
                index: column_index,
                len: column_count,
            });
        }
        self.update_state(|state| {
            state
                .sort
                .set_column(SortColumn::new(column_index, direction))
        });
        Ok(())
    }

    /// Back to canonical order
    pub fn clear_sort(&self) {
        self.update_state(|state| state.sort.clear());
    }

    pub fn sort(&self) -> MultiColumnSort {
        self.state.lock().sort.clone()
    }

    /// Distinct values of a column over all rows, ignoring this view's filters
    pub fn unique_values(&self, column_index: usize) -> Result<Vec<Value>> {
        let null_position = self.state.lock().sort.null_position();
        unique_values(&self.model.snapshot(), column_index, null_position)
    }

    /// Select the cell at `view_row`, `column`
    pub fn select(&self, view_row: usize, column: usize) -> Result<Selection> {
        let mut state = self.state.lock();
        let canonical_row = state.canonical(view_row, self.model.revision())?;
        let selection = Selection {
            canonical_row,
            view_row,
            column,
        };
        state.selection = Some(selection);
        Ok(selection)
    }

    pub fn selection(&self) -> Option<Selection> {
        self.state.lock().selection
    }

    pub fn clear_selection(&self) {
        self.state.lock().selection = None;
    }

    /// Catch up with the model's current snapshot. Needed only after
    /// `detach`; an attached view is remapped on every change. A selection
    /// cannot be followed across unseen changes and is cleared.
    pub fn refresh(&self) {
        let mut state = self.state.lock();
        let (snapshot, revision) = self.model.snapshot_with_revision();
        if revision != state.mapped_revision {
            state.selection = None;
        }
        state.remap(snapshot, revision);
    }

    /// Stop receiving change events. The mapping is kept but goes stale on
    /// the model's next change.
    pub fn detach(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.model.unsubscribe(id);
            tracing::debug!(table = %self.model.name(), "View detached");
        }
    }

    /// Commit a new value for the cell at `view_row`, `column`.
    ///
    /// Unchanged values are dropped without contacting the sink.
    pub async fn commit_edit<S>(
        &self,
        sink: &S,
        view_row: usize,
        column: usize,
        value: Value,
    ) -> std::result::Result<EditOutcome, S::Error>
    where
        S: UpdateSink + ?Sized,
    {
        let current = {
            let state = self.state.lock();
            let canonical = state.canonical(view_row, self.model.revision())?;
            state.snapshot.row(canonical)?.clone()
        };

        let old_value = current.get(column).ok_or(CoreError::IndexOutOfRange {
            index: column,
            len: current.len(),
        })?;
        if *old_value == value {
            tracing::trace!(view_row, column, "Edit unchanged, skipping write");
            return Ok(EditOutcome::Unchanged);
        }

        sink.request_update(current, vec![(column, value)]).await?;
        Ok(EditOutcome::Submitted)
    }

    /// Parse `text` as the column's type, then commit it
    pub async fn commit_text_edit<S>(
        &self,
        sink: &S,
        view_row: usize,
        column: usize,
        text: &str,
    ) -> std::result::Result<EditOutcome, S::Error>
    where
        S: UpdateSink + ?Sized,
    {
        let value = self.model.snapshot().column(column)?.parse(text)?;
        self.commit_edit(sink, view_row, column, value).await
    }

    fn update_state(&self, op: impl FnOnce(&mut ViewState)) {
        let mut state = self.state.lock();
        op(&mut state);
        state.rebuild();
    }
}

impl ChangeListener for ViewBinding {
    fn on_change(&self, event: &ChangeEvent) {
        if matches!(event.kind, ChangeKind::WriteRejected { .. }) {
            return;
        }

        let mut state = self.state.lock();
        if event.revision <= state.mapped_revision {
            return;
        }

        let row_count = event.snapshot.row_count();
        state.selection = state.selection.and_then(|selection| {
            shift_canonical(selection.canonical_row, &event.kind, row_count).map(|canonical_row| {
                Selection {
                    canonical_row,
                    ..selection
                }
            })
        });
        state.remap(Arc::clone(&event.snapshot), event.revision);

        tracing::trace!(
            table = %self.model.name(),
            revision = event.revision,
            visible = state.index.len(),
            "View remapped"
        );
    }
}

impl Drop for ViewBinding {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for ViewBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ViewBinding")
            .field("table", &self.model.name())
            .field("filters", &state.filters)
            .field("visible_rows", &state.index.len())
            .field("mapped_revision", &state.mapped_revision)
            .finish()
    }
}
