//! dbgrid Core - Core types and collaborator traits for the table cache
//!
//! This crate provides the fundamental types that the other dbgrid crates
//! depend on. It defines:
//!
//! - `Value`, `Column`, `ColumnType`, `Row` - Typed cell and schema model
//! - `TableSnapshot` - The canonical, always schema-valid copy of a table
//! - `Store` - Trait for the external database the cache writes through to
//! - `GridConfig` - Tunables loaded from TOML or JSON
//! - `CoreError` - Error taxonomy shared by every layer

mod config;
mod error;
mod snapshot;
mod store;
mod types;

pub use config::*;
pub use error::*;
pub use snapshot::*;
pub use store::*;
pub use types::*;
