//! Reconciliation error contract
//!
//! Callers branch on these kinds: conflicts are recoverable (retry without
//! fail-on-conflict, or surface to the user), lock contention means another
//! writer holds the index, missing content aborts before any disk write,
//! and a write failure may leave the working tree partially updated; the
//! planned update/removal sets stay readable on the reconciler for
//! inspection.

use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Unresolved conflicts exist and fail-on-conflict is set; nothing was
    /// mutated
    #[error("checkout would lose local changes to {} path(s); refusing to merge", paths.len())]
    Conflicts { paths: Vec<PathBuf> },

    /// A planned update references content the object store cannot
    /// resolve; detected before any disk write
    #[error("missing blob {oid} for {}", path.display())]
    MissingContent { oid: ObjectId, path: PathBuf },

    /// A filesystem write, rename, or delete failed after the single
    /// retry; earlier writes in this run are not rolled back
    #[error("failed to update working tree at {}: {cause}", path.display())]
    WriteFailure { path: PathBuf, cause: anyhow::Error },

    /// The index is already locked by another writer
    #[error("index is locked by another process (lockfile {} exists)", path.display())]
    LockContention { path: PathBuf },

    /// The object store itself failed
    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
