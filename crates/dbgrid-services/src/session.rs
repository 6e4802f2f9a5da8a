//! Browser session
//!
//! Owns the store connection, the shared undo log and one [`TableEditor`] per
//! open table. Undo is session-wide: `undo_last` reverses the newest write
//! whatever table it touched.

use std::collections::HashMap;
use std::sync::Arc;

use dbgrid_core::{Column, CoreError, GridConfig, Store};
use dbgrid_table::{TableModel, ViewBinding};
use parking_lot::{Mutex, RwLock};

use crate::error::{EditError, EditResult};
use crate::table_editor::TableEditor;
use crate::undo::{UndoEntry, UndoLog, UndoOperation, WriteKind};

pub struct BrowserSession {
    store: Arc<dyn Store>,
    config: GridConfig,
    undo: Arc<Mutex<UndoLog>>,
    tables: RwLock<HashMap<String, Arc<TableEditor>>>,
}

impl BrowserSession {
    pub fn new(store: Arc<dyn Store>, config: GridConfig) -> Self {
        tracing::info!(
            store = store.store_name(),
            undo_capacity = config.undo_capacity,
            "Browser session created"
        );
        Self {
            undo: Arc::new(Mutex::new(UndoLog::new(config.undo_capacity))),
            store,
            config,
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Tables the store offers
    pub async fn list_tables(&self) -> EditResult<Vec<String>> {
        self.store
            .list_tables()
            .await
            .map_err(|e| EditError::RemoteFailure(e.to_string()))
    }

    /// Load `table` from the store, or return it if it is already open
    #[tracing::instrument(skip(self))]
    pub async fn open_table(&self, table: &str) -> EditResult<Arc<TableEditor>> {
        if let Some(editor) = self.tables.read().get(table) {
            return Ok(Arc::clone(editor));
        }

        let data = self
            .store
            .fetch_all(table)
            .await
            .map_err(|e| EditError::RemoteFailure(e.to_string()))?;
        let model = TableModel::new(table, data.columns, data.rows)?;
        tracing::debug!(rows = model.row_count(), "Table loaded");

        let editor = self.editor_for(model);
        let mut tables = self.tables.write();
        // Another caller may have opened it while we were fetching
        let editor = tables.entry(table.to_string()).or_insert(editor);
        Ok(Arc::clone(editor))
    }

    pub fn editor(&self, table: &str) -> EditResult<Arc<TableEditor>> {
        self.tables
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| EditError::TableNotOpen(table.to_string()))
    }

    pub fn model(&self, table: &str) -> EditResult<Arc<TableModel>> {
        self.editor(table).map(|editor| Arc::clone(editor.model()))
    }

    /// Bind a new grid view to an open table
    pub fn attach_view(&self, table: &str) -> EditResult<Arc<ViewBinding>> {
        let model = self.model(table)?;
        Ok(ViewBinding::attach(model, self.config.null_position))
    }

    /// Names of the open tables, sorted
    pub fn open_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close `table`, dropping its undo history. Returns false if it was not
    /// open.
    pub fn close_table(&self, table: &str) -> bool {
        let closed = self.tables.write().remove(table).is_some();
        if closed {
            let dropped = self.undo.lock().remove_table(table);
            tracing::debug!(table, dropped_undo_entries = dropped, "Table closed");
        }
        closed
    }

    /// Reload an open table from the store
    pub async fn refresh_table(&self, table: &str) -> EditResult<()> {
        self.editor(table)?.resync().await
    }

    /// Create an empty table in the store and open it
    #[tracing::instrument(skip(self, columns))]
    pub async fn create_table(
        &self,
        table: &str,
        columns: Vec<Column>,
    ) -> EditResult<Arc<TableEditor>> {
        if self.tables.read().contains_key(table) {
            return Err(CoreError::SchemaMismatch(format!(
                "table '{}' is already open",
                table
            ))
            .into());
        }
        let model = TableModel::new(table, columns.clone(), Vec::new())?;

        self.store
            .create_table(table, &columns)
            .await
            .map_err(|e| EditError::RemoteFailure(e.to_string()))?;

        let editor = self.editor_for(model);
        self.tables
            .write()
            .insert(table.to_string(), Arc::clone(&editor));
        self.undo
            .lock()
            .push(UndoEntry::new(table, UndoOperation::CreateTable { columns }));

        tracing::info!(columns = editor.model().column_count(), "Table created");
        Ok(editor)
    }

    /// Reverse the newest recorded write
    pub async fn undo_last(&self) -> EditResult<WriteKind> {
        let entry = self.undo.lock().pop().ok_or(EditError::EmptyUndoLog)?;

        if let UndoOperation::CreateTable { .. } = entry.operation {
            return self.undo_create_table(entry).await;
        }

        let editor = match self.editor(&entry.table) {
            Ok(editor) => editor,
            Err(e) => {
                tracing::warn!(table = %entry.table, "Dropping undo entry for a closed table");
                return Err(e);
            }
        };
        editor.undo(entry).await
    }

    /// Number of writes that can be undone
    pub fn undo_depth(&self) -> usize {
        self.undo.lock().len()
    }

    /// Kinds of the recorded writes, oldest first
    pub fn undo_history(&self) -> Vec<(String, WriteKind)> {
        self.undo
            .lock()
            .iter()
            .map(|entry| (entry.table.clone(), entry.kind()))
            .collect()
    }

    async fn undo_create_table(&self, entry: UndoEntry) -> EditResult<WriteKind> {
        if let Err(e) = self.store.drop_table(&entry.table).await {
            tracing::warn!(table = %entry.table, error = %e, "Store refused to drop table");
            self.undo.lock().push(entry);
            return Err(EditError::RemoteFailure(e.to_string()));
        }

        self.close_table(&entry.table);
        tracing::info!(table = %entry.table, "Created table dropped by undo");
        Ok(WriteKind::CreateTable)
    }

    fn editor_for(&self, model: TableModel) -> Arc<TableEditor> {
        Arc::new(TableEditor::new(
            Arc::new(model),
            Arc::clone(&self.store),
            Arc::clone(&self.undo),
        ))
    }
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("store", &self.store.store_name())
            .field("open_tables", &self.open_tables())
            .field("undo_depth", &self.undo_depth())
            .finish()
    }
}
