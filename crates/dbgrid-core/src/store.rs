//! Store trait and write requests
//!
//! The store is the external database the cache writes through to. The cache
//! never runs SQL itself; it hands fully-resolved requests to a `Store`
//! implementation and interprets the affected-row counts it gets back.

use async_trait::async_trait;

use crate::{Column, Result, Row, TableSnapshot, Value};

/// Identifies the remote row(s) a write applies to by the complete prior row,
/// the WHERE-equivalent of an exact structural match
#[derive(Debug, Clone, PartialEq)]
pub struct RowCriteria {
    /// Every column paired with the value it must hold
    pub values: Vec<(String, Value)>,
}

impl RowCriteria {
    /// Pair a full row with its column names
    pub fn from_row(columns: &[Column], row: &Row) -> Self {
        Self {
            values: row.named(columns),
        }
    }

    /// Render as a parameterized SQL predicate.
    ///
    /// NULL cells become `IS NULL` and contribute no parameter; every other
    /// cell becomes `"col" = ?` with its value appended to the parameter list.
    pub fn to_sql_predicate(&self) -> (String, Vec<Value>) {
        let conditions: Vec<String> = self
            .values
            .iter()
            .map(|(col, val)| {
                if val.is_null() {
                    format!("{} IS NULL", escape_identifier(col))
                } else {
                    format!("{} = ?", escape_identifier(col))
                }
            })
            .collect();
        let params: Vec<Value> = self
            .values
            .iter()
            .filter(|(_, val)| !val.is_null())
            .map(|(_, v)| v.clone())
            .collect();
        (conditions.join(" AND "), params)
    }
}

/// Quote a SQL identifier with ANSI double quotes
pub fn escape_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Request to insert one row
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    pub table_name: String,
    /// Column name/value pairs in column order
    pub values: Vec<(String, Value)>,
}

/// Request to update the row(s) matching `criteria`
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub table_name: String,
    /// Column name/new value pairs for the changed cells only
    pub changes: Vec<(String, Value)>,
    pub criteria: RowCriteria,
}

/// Request to delete the row(s) matching `criteria`
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub table_name: String,
    pub criteria: RowCriteria,
}

/// Columns and rows as fetched from the store
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl TableData {
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }
}

impl From<TableSnapshot> for TableData {
    fn from(snapshot: TableSnapshot) -> Self {
        Self {
            columns: snapshot.columns().to_vec(),
            rows: snapshot.rows().to_vec(),
        }
    }
}

/// The external database the cache writes through to.
///
/// Implementations own blocking and async I/O; the cache only awaits the
/// returned futures. Any error is treated as a remote failure.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short identifier for logs (e.g. "sqlite", "postgresql")
    fn store_name(&self) -> &str;

    /// List the tables available for browsing
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Fetch every column and row of `table`
    async fn fetch_all(&self, table: &str) -> Result<TableData>;

    /// Insert a single row
    async fn exec_insert(&self, request: InsertRequest) -> Result<()>;

    /// Update matching rows, returning the number of rows affected
    async fn exec_update(&self, request: UpdateRequest) -> Result<u64>;

    /// Delete matching rows, returning the number of rows affected
    async fn exec_delete(&self, request: DeleteRequest) -> Result<u64>;

    /// Create an empty table
    async fn create_table(&self, table: &str, columns: &[Column]) -> Result<()>;

    /// Drop a table
    async fn drop_table(&self, table: &str) -> Result<()>;
}
