//! Checkout/merge reconciliation core.
//!
//! Given up to three tree snapshots (a baseline HEAD tree, a target merge
//! tree, and the staged index) plus the live working directory, `twig`
//! computes the minimal set of file updates, removals, and conflict stages
//! needed to move the working directory and index to the target state, and
//! applies it with an exclusive index lock and atomic index replacement.
//!
//! The crate is split the way the rest of the engine is laid out:
//!
//! - `areas`: the stores: object database boundary, index file, workspace
//! - `artifacts`: data structures and the reconciliation algorithm itself
//!
//! The object database is consumed through the [`ObjectStore`] trait; a
//! [`MemoryDatabase`] implementation ships for embedders and tests.

pub mod areas;
pub mod artifacts;

pub use areas::database::{MemoryDatabase, ObjectStore};
pub use areas::index::{Index, LockedIndex};
pub use areas::workspace::Workspace;
pub use artifacts::index::entry_mode::{EntryMode, FileMode};
pub use artifacts::index::index_entry::{EntryMetadata, IndexEntry, Stage};
pub use artifacts::objects::object_id::ObjectId;
pub use artifacts::objects::tree::{Tree, TreeNode};
pub use artifacts::reconcile::accumulator::ReconcileReport;
pub use artifacts::reconcile::error::ReconcileError;
pub use artifacts::reconcile::reconciler::{ReconcileOptions, Reconciler};
