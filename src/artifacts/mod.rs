//! Data structures and algorithms
//!
//! This module contains the core types and the reconciliation algorithm:
//!
//! - `index`: index entry types and the persisted index format
//! - `objects`: content identifiers, tree listings, blob hashing
//! - `reconcile`: the four-source walk, decision engine, and applier glue

pub mod index;
pub mod objects;
pub mod reconcile;
