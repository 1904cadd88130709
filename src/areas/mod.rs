//! Repository stores
//!
//! The stores the reconciliation engine reads and mutates:
//!
//! - `database`: the object store boundary (trees and blobs by content id)
//! - `index`: the staged snapshot, with its lock/commit protocol
//! - `workspace`: working directory enumeration, stat, and the applier

pub mod database;
pub mod index;
pub mod workspace;
