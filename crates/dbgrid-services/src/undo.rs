//! Bounded undo history
//!
//! An entry is recorded once a write is applied locally and taken back by id
//! if the store then refuses it. When the log is full the oldest entry is
//! evicted.

use std::collections::VecDeque;
use std::fmt;

use dbgrid_core::{Column, Row};
use uuid::Uuid;

/// Kind of write an undo entry reverses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
    CreateTable,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::CreateTable => write!(f, "CREATE TABLE"),
        }
    }
}

/// What is needed to reverse one write
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOperation {
    /// Undo deletes one copy of `row`
    Insert { row: Row },
    /// Undo restores `prior` over the row now equal to `updated`
    Update {
        prior: Row,
        updated: Row,
        /// Indices of the columns the write changed
        columns: Vec<usize>,
        /// Canonical index the write landed on. Preferred, not trusted: the
        /// row is still located by value.
        index: usize,
    },
    /// Undo re-inserts `rows` at their former canonical indices
    Delete { rows: Vec<(usize, Row)> },
    /// Undo drops the table
    CreateTable { columns: Vec<Column> },
}

impl UndoOperation {
    pub fn kind(&self) -> WriteKind {
        match self {
            Self::Insert { .. } => WriteKind::Insert,
            Self::Update { .. } => WriteKind::Update,
            Self::Delete { .. } => WriteKind::Delete,
            Self::CreateTable { .. } => WriteKind::CreateTable,
        }
    }
}

/// One reversible write against a table
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    pub id: Uuid,
    pub table: String,
    pub operation: UndoOperation,
}

impl UndoEntry {
    pub fn new(table: impl Into<String>, operation: UndoOperation) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            operation,
        }
    }

    pub fn kind(&self) -> WriteKind {
        self.operation.kind()
    }
}

/// Capacity-bounded stack of undo entries, newest last
#[derive(Debug, Clone)]
pub struct UndoLog {
    entries: VecDeque<UndoEntry>,
    capacity: usize,
}

impl UndoLog {
    /// A zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Record an entry, returning the oldest one if it had to be evicted
    pub fn push(&mut self, entry: UndoEntry) -> Option<UndoEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            tracing::trace!(id = %old.id, table = %old.table, "Undo entry evicted");
        }
        self.entries.push_back(entry);
        evicted
    }

    /// Remove and return the newest entry
    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    /// Remove a specific entry wherever it sits
    pub fn take(&mut self, id: Uuid) -> Option<UndoEntry> {
        let position = self.entries.iter().position(|e| e.id == id)?;
        self.entries.remove(position)
    }

    pub fn peek(&self) -> Option<&UndoEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries oldest first
    pub fn iter(&self) -> impl Iterator<Item = &UndoEntry> {
        self.entries.iter()
    }

    /// Forget every entry for `table`, returning how many were dropped
    pub fn remove_table(&mut self, table: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.table != table);
        before - self.entries.len()
    }
}
