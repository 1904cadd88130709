//! Checkout/merge reconciliation
//!
//! Computes and applies the transition from the current index and working
//! directory to a target merge tree, optionally three-way against a HEAD
//! tree:
//!
//! - `entry_source`: the uniform cursor over trees, index, working tree
//! - `walker`: merges the cursors into one ordered stream of quadruples
//! - `decision`: the pure per-path decision engine and its resolution table
//! - `inspector`: the working-vs-index modified check
//! - `accumulator`: the new index snapshot and the run's report
//! - `reconciler`: orchestration, clash guards, apply, and commit
//! - `error`: the typed failure contract
//!
//! All conflicts are detected before anything is mutated; with
//! fail-on-conflict set, a conflicted run aborts without touching the
//! working tree or the index.

pub mod accumulator;
pub mod decision;
pub mod entry_source;
pub mod error;
pub mod inspector;
pub mod reconciler;
pub mod walker;
