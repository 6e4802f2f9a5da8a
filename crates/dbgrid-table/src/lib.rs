//! dbgrid Table - The shared table cache and its views
//!
//! One [`TableModel`] holds the canonical snapshot of a table. Any number of
//! [`ViewBinding`]s project it through their own filters and sort order, and
//! are kept current by the model's [`ChangeBus`].
//!
//! ```text
//! edit in a view ──► UpdateSink ──► TableModel mutation
//!                                        │
//!                                        ▼
//!                         ChangeBus ──► every ViewBinding re-filters
//! ```
//!
//! # Modules
//!
//! - `model` - Canonical snapshot owner, the only mutation path
//! - `bus` - Synchronous change notification fan-out
//! - `filter` - Exact-match per-column filter predicates
//! - `sorting` - View-local multi-column sorting with null handling
//! - `view` - Filtered, sorted, selection-preserving projections

mod bus;
mod filter;
mod model;
mod sorting;
mod view;

pub use bus::{ChangeBus, ChangeEvent, ChangeKind, ChangeListener, SubscriptionId};
pub use filter::{FilterSet, unique_values};
pub use model::TableModel;
pub use sorting::{MultiColumnSort, SortColumn, SortDirection, compare_values};
pub use view::{EditOutcome, Selection, UpdateSink, ViewBinding};
