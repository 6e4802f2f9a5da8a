//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dbgrid_core::{
    Column, ColumnType, CoreError, DeleteRequest, InsertRequest, Result, Row, RowCriteria, Store,
    TableData, UpdateRequest, Value,
};

/// In-memory store for testing the write path without a real database.
///
/// Writes really apply to the stored tables, so affected counts come from the
/// data. Tests that need the store to disagree with the cache edit the remote
/// rows directly with [`MockStore::set_remote_rows`].
pub struct MockStore {
    pub name: String,
    tables: parking_lot::Mutex<HashMap<String, TableData>>,
    fail_writes: AtomicBool,
    /// Log of every call, e.g. `"exec_update users"`
    pub call_log: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MockStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: parking_lot::Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            call_log: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    pub fn with_table(self, table: &str, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        self.tables
            .lock()
            .insert(table.to_string(), TableData::new(columns, rows));
        self
    }

    /// Make every write fail from now on
    pub fn with_failure(self) -> Self {
        self.set_fail_writes(true);
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn remote_rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .get(table)
            .map(|data| data.rows.clone())
            .unwrap_or_default()
    }

    pub fn set_remote_rows(&self, table: &str, rows: Vec<Row>) {
        if let Some(data) = self.tables.lock().get_mut(table) {
            data.rows = rows;
        }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.lock().contains_key(table)
    }

    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }

    /// Number of logged calls starting with `prefix`
    pub fn calls(&self, prefix: &str) -> usize {
        self.call_log
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn log(&self, call: &str, table: &str) {
        self.call_log.lock().push(format!("{} {}", call, table));
    }

    fn check_writable(&self, call: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(CoreError::RemoteFailure(format!("{} failed", call)))
        } else {
            Ok(())
        }
    }
}

fn row_matches(columns: &[Column], row: &Row, criteria: &RowCriteria) -> bool {
    criteria.values.iter().all(|(name, value)| {
        columns
            .iter()
            .position(|c| &c.name == name)
            .and_then(|index| row.get(index))
            .is_some_and(|cell| cell == value)
    })
}

fn missing(table: &str) -> CoreError {
    CoreError::NotFound(format!("table '{}'", table))
}

#[async_trait]
impl Store for MockStore {
    fn store_name(&self) -> &str {
        &self.name
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn fetch_all(&self, table: &str) -> Result<TableData> {
        self.log("fetch_all", table);
        self.tables
            .lock()
            .get(table)
            .cloned()
            .ok_or_else(|| missing(table))
    }

    async fn exec_insert(&self, request: InsertRequest) -> Result<()> {
        self.log("exec_insert", &request.table_name);
        self.check_writable("insert")?;

        let mut tables = self.tables.lock();
        let data = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| missing(&request.table_name))?;
        let values = data
            .columns
            .iter()
            .map(|column| {
                request
                    .values
                    .iter()
                    .find(|(name, _)| *name == column.name)
                    .map(|(_, value)| value.clone())
                    .unwrap_or(Value::Null)
            })
            .collect();
        data.rows.push(Row::new(values));
        Ok(())
    }

    async fn exec_update(&self, request: UpdateRequest) -> Result<u64> {
        self.log("exec_update", &request.table_name);
        self.check_writable("update")?;

        let mut tables = self.tables.lock();
        let data = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| missing(&request.table_name))?;
        let mut affected = 0;
        for row in data.rows.iter_mut() {
            if !row_matches(&data.columns, row, &request.criteria) {
                continue;
            }
            for (name, value) in &request.changes {
                if let Some(index) = data.columns.iter().position(|c| &c.name == name) {
                    row.values[index] = value.clone();
                }
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn exec_delete(&self, request: DeleteRequest) -> Result<u64> {
        self.log("exec_delete", &request.table_name);
        self.check_writable("delete")?;

        let mut tables = self.tables.lock();
        let data = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| missing(&request.table_name))?;
        let before = data.rows.len();
        let columns = data.columns.clone();
        data.rows
            .retain(|row| !row_matches(&columns, row, &request.criteria));
        Ok((before - data.rows.len()) as u64)
    }

    async fn create_table(&self, table: &str, columns: &[Column]) -> Result<()> {
        self.log("create_table", table);
        self.check_writable("create table")?;

        let mut tables = self.tables.lock();
        if tables.contains_key(table) {
            return Err(CoreError::RemoteFailure(format!(
                "table '{}' already exists",
                table
            )));
        }
        tables.insert(table.to_string(), TableData::new(columns.to_vec(), vec![]));
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.log("drop_table", table);
        self.check_writable("drop table")?;

        self.tables
            .lock()
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| missing(table))
    }
}

/// `(id integer, name text)` columns
pub fn user_columns() -> Vec<Column> {
    vec![
        Column::new("id", ColumnType::Integer),
        Column::new("name", ColumnType::VarText),
    ]
}

pub fn user(id: i32, name: &str) -> Row {
    Row::new(vec![Value::Int32(id), Value::from(name)])
}

/// A store holding `users` with rows `(1, "a")` and `(2, "b")`
pub fn users_store() -> Arc<MockStore> {
    Arc::new(MockStore::new("mock").with_table(
        "users",
        user_columns(),
        vec![user(1, "a"), user(2, "b")],
    ))
}

/// Sort rows by their rendered form for order-insensitive comparison
pub fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by_key(|row| {
        row.values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
    });
    rows
}
