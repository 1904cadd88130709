//! Result accumulator
//!
//! Collects the decision for each visited path into the new index snapshot
//! and the run's report. The snapshot never holds two entries at the same
//! stage for one path, and a conflicted path never keeps a stage-0 entry.
//! Directories are not leaf entries: updates and keeps of directory kind
//! contribute nothing.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{EntryKey, EntryMetadata, IndexEntry, Stage};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::reconcile::entry_source::SourceEntry;
use crate::artifacts::reconcile::walker::Quadruple;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// What one reconciliation run decided, for reporting
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    updated: BTreeMap<PathBuf, (ObjectId, EntryMode)>,
    removed: BTreeSet<PathBuf>,
    conflicts: BTreeSet<PathBuf>,
}

impl ReconcileReport {
    /// Paths written or rewritten, with their new content id and kind
    pub fn updated(&self) -> &BTreeMap<PathBuf, (ObjectId, EntryMode)> {
        &self.updated
    }

    /// Paths deleted from the index and working tree
    pub fn removed(&self) -> &BTreeSet<PathBuf> {
        &self.removed
    }

    /// Paths left in an unresolved conflict
    pub fn conflicts(&self) -> &BTreeSet<PathBuf> {
        &self.conflicts
    }

    pub fn is_noop(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty() && self.conflicts.is_empty()
    }
}

/// Builds the new index snapshot as paths are decided
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    entries: BTreeMap<EntryKey, IndexEntry>,
    report: ReconcileReport,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> &ReconcileReport {
        &self.report
    }

    /// Carry the path's existing index entries unchanged
    pub fn keep(&mut self, q: &Quadruple) {
        let Some(slot) = &q.index else {
            return;
        };

        for entry in slot.entries() {
            self.entries.insert(entry.key(), entry.clone());
        }
    }

    /// Replace the path's stage-0 entry with the merge side
    pub fn update(&mut self, path: &Path, oid: &ObjectId, mode: &EntryMode) {
        if mode.is_tree() {
            return;
        }

        self.report
            .updated
            .insert(path.to_path_buf(), (oid.clone(), mode.clone()));
        let entry = IndexEntry::new(
            path.to_path_buf(),
            oid.clone(),
            Stage::Merged,
            EntryMetadata::for_mode(mode.clone()),
        );
        self.entries.insert(entry.key(), entry);
    }

    /// Drop the path from the snapshot and schedule its deletion
    pub fn remove(&mut self, path: &Path) {
        self.report.removed.insert(path.to_path_buf());
    }

    /// Stage the non-absent sides of the path: 1 = head, 2 = the index's
    /// prior content, 3 = merge, and report the conflict
    pub fn conflict(&mut self, q: &Quadruple) {
        self.report.conflicts.insert(q.path.clone());

        if let Some(entry) = Self::side_entry(&q.path, q.head.as_ref(), Stage::Base) {
            self.entries.insert(entry.key(), entry);
        }

        if let Some(prior) = q.index_entry() {
            let mut ours = prior.clone();
            ours.stage = Stage::Ours;
            self.entries.insert(ours.key(), ours);
        }

        if let Some(entry) = Self::side_entry(&q.path, q.merge.as_ref(), Stage::Theirs) {
            self.entries.insert(entry.key(), entry);
        }
    }

    /// Report a conflict at a path with no sides to stage (a file beneath a
    /// directory that is in the way)
    pub fn conflict_path(&mut self, path: PathBuf) {
        self.report.conflicts.insert(path);
    }

    fn side_entry(path: &Path, side: Option<&SourceEntry>, stage: Stage) -> Option<IndexEntry> {
        let side = side?;
        if side.mode.is_tree() {
            return None;
        }

        let oid = side.oid.clone()?;
        Some(IndexEntry::new(
            path.to_path_buf(),
            oid,
            stage,
            EntryMetadata::for_mode(side.mode.clone()),
        ))
    }

    /// One-tree traversal resolves a removed path over a recorded conflict
    pub fn drop_conflicts_in_removed(&mut self) {
        let removed = self.report.removed.clone();
        self.report.conflicts.retain(|path| !removed.contains(path));
    }

    /// Record the stat of a freshly written entry so it reads as clean;
    /// the entry's kind stays what the merge tree said, not what the disk
    /// reports
    pub fn record_stat(&mut self, path: &Path, metadata: EntryMetadata) {
        let key = EntryKey::new(path.to_path_buf(), Stage::Merged);
        if let Some(entry) = self.entries.get_mut(&key) {
            let mode = entry.metadata.mode.clone();
            entry.metadata = EntryMetadata { mode, ..metadata };
        }
    }

    /// The finished snapshot in (path, stage) order
    pub fn finish(self) -> (Vec<IndexEntry>, ReconcileReport) {
        (self.entries.into_values().collect(), self.report)
    }
}
