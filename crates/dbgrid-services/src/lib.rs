//! dbgrid Services Layer
//!
//! Sits between the grid UI and the table cache. Edits coming from views are
//! applied optimistically to the shared model, recorded for undo and written
//! through to the external store.
//!
//! # Architecture
//!
//! ```text
//! UI (grids, menus)
//!     ↓
//! Service Layer (dbgrid-services) ← This crate
//!     ↓
//! Table cache (dbgrid-table: model, bus, views)
//!     ↓
//! Core types and the Store trait (dbgrid-core)
//! ```
//!
//! # Services
//!
//! - [`BrowserSession`] - Open tables, session-wide undo, table creation
//! - [`TableEditor`] - Optimistic insert/update/delete for one table
//! - [`UndoLog`] - Bounded history of reversible writes
//!
//! # Design Principles
//!
//! 1. **Local first** - The model changes before the store is asked
//! 2. **Roll back on rejection** - A refused write leaves no local trace
//! 3. **Reload on disagreement** - Unexpected affected counts trigger a resync

mod error;
pub mod logging;
mod session;
mod table_editor;
mod undo;

pub use error::{EditError, EditResult};
pub use session::BrowserSession;
pub use table_editor::{TableEditor, WriteOutcome};
pub use undo::{UndoEntry, UndoLog, UndoOperation, WriteKind};
