//! Reconciliation orchestration
//!
//! Wires the pieces together for one run: walk the four sources in path
//! order, decide each path, accumulate the new snapshot, and then, unless
//! conflicts abort the run, apply removals and updates to the working
//! tree and atomically commit the new index. The caller supplies an
//! already-locked index; the lock is released on every exit path, by
//! commit or by abort.
//!
//! A write failure mid-apply cannot be rolled back without a journal,
//! which this engine does not keep. The planned update and removal sets
//! stay readable through the accessors so the caller can inspect what was
//! in flight.

use crate::areas::database::ObjectStore;
use crate::areas::index::LockedIndex;
use crate::areas::workspace::Workspace;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::TreeNode;
use crate::artifacts::reconcile::accumulator::{ReconcileReport, SnapshotBuilder};
use crate::artifacts::reconcile::decision::{Action, decide, decide_one_tree};
use crate::artifacts::reconcile::entry_source::{EntrySource, IndexCursor, TreeCursor, WorktreeCursor};
use crate::artifacts::reconcile::error::ReconcileError;
use crate::artifacts::reconcile::inspector::Inspector;
use crate::artifacts::reconcile::walker::{PathWalker, Quadruple};
use anyhow::anyhow;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Per-run configuration, read once and threaded explicitly
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Abort without touching anything when conflicts exist; when off,
    /// conflicting working files are destructively cleaned up instead
    pub fail_on_conflict: bool,
    /// Honor the executable bit when comparing and writing entries
    pub respect_file_mode: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions {
            fail_on_conflict: true,
            respect_file_mode: true,
        }
    }
}

/// One reconciliation run
///
/// Two-tree mode (head present) serves checkout and merge; one-tree mode
/// (no head) serves initial checkout. The run owns the index lock for its
/// whole span.
pub struct Reconciler<'r, S: ObjectStore> {
    store: &'r S,
    workspace: &'r Workspace,
    locked: Option<LockedIndex>,
    head: Option<ObjectId>,
    merge: ObjectId,
    options: ReconcileOptions,
    report: ReconcileReport,
}

impl<'r, S: ObjectStore> Reconciler<'r, S> {
    pub fn new(
        store: &'r S,
        workspace: &'r Workspace,
        index: LockedIndex,
        head: Option<ObjectId>,
        merge: ObjectId,
        options: ReconcileOptions,
    ) -> Self {
        Reconciler {
            store,
            workspace,
            locked: Some(index),
            head,
            merge,
            options,
            report: ReconcileReport::default(),
        }
    }

    /// Paths written by the last run
    pub fn updated(&self) -> &BTreeMap<PathBuf, (ObjectId, EntryMode)> {
        self.report.updated()
    }

    /// Paths removed by the last run
    pub fn removed(&self) -> &BTreeSet<PathBuf> {
        self.report.removed()
    }

    /// Paths the last run left in conflict
    pub fn conflicts(&self) -> &BTreeSet<PathBuf> {
        self.report.conflicts()
    }

    pub fn report(&self) -> &ReconcileReport {
        &self.report
    }

    /// Execute the run: scan, decide, apply, commit
    pub fn reconcile(&mut self) -> Result<(), ReconcileError> {
        let result = self.run();
        if result.is_err() {
            self.abort();
        }

        result
    }

    fn run(&mut self) -> Result<(), ReconcileError> {
        let mut builder = SnapshotBuilder::new();
        self.scan(&mut builder)?;

        if self.head.is_none() {
            builder.drop_conflicts_in_removed();
        }
        self.report = builder.report().clone();

        tracing::debug!(
            updated = self.report.updated().len(),
            removed = self.report.removed().len(),
            conflicts = self.report.conflicts().len(),
            "reconciliation planned"
        );

        if !self.report.conflicts().is_empty() && self.options.fail_on_conflict {
            return Err(ReconcileError::Conflicts {
                paths: self.report.conflicts().iter().cloned().collect(),
            });
        }

        self.verify_content()?;

        if !self.options.fail_on_conflict {
            let conflicts: Vec<PathBuf> = self.report.conflicts().iter().cloned().collect();
            for path in conflicts {
                self.remove_path(&path)?;
            }
        }

        let removed: Vec<PathBuf> = self.report.removed().iter().cloned().collect();
        for path in removed {
            self.remove_path(&path)?;
        }

        let updates: Vec<(PathBuf, ObjectId, EntryMode)> = self
            .report
            .updated()
            .iter()
            .map(|(path, (oid, mode))| (path.clone(), oid.clone(), mode.clone()))
            .collect();
        for (path, oid, mode) in updates {
            let metadata = self.apply_update(&path, &oid, &mode)?;
            builder.record_stat(&path, metadata);
        }

        let (entries, report) = builder.finish();
        self.report = report;

        let locked = self
            .locked
            .take()
            .ok_or_else(|| ReconcileError::Store(anyhow!("Reconciler already ran")))?;
        let index_path = locked.index().path().to_path_buf();
        locked
            .commit(entries)
            .map_err(|cause| ReconcileError::WriteFailure {
                path: index_path,
                cause,
            })?;

        Ok(())
    }

    fn scan(&self, builder: &mut SnapshotBuilder) -> Result<(), ReconcileError> {
        let index_snapshot = self
            .locked
            .as_ref()
            .ok_or_else(|| ReconcileError::Store(anyhow!("Reconciler already ran")))?
            .index();

        let inspector = Inspector::new(self.workspace, self.options.respect_file_mode);

        let head_source = match &self.head {
            Some(oid) => Some(EntrySource::Tree(TreeCursor::open(self.store, oid)?)),
            None => None,
        };
        let merge_source = EntrySource::Tree(TreeCursor::open(self.store, &self.merge)?);
        let index_source: EntrySource<'_, S> =
            EntrySource::Index(IndexCursor::new(index_snapshot));
        let working_source: EntrySource<'_, S> =
            EntrySource::Working(WorktreeCursor::open(self.workspace)?);

        let two_tree = self.head.is_some();
        let mut walker = PathWalker::new(head_source, merge_source, index_source, working_source);
        let mut visited = 0usize;

        while let Some(q) = walker.next()? {
            visited += 1;

            let action = if two_tree {
                let clean = inspector.is_clean(&q)?;
                let ancestor_blob = if q.head.is_none() && q.index_entry().is_some() {
                    has_parent_blob(self.store, &self.merge, &q.path)?
                } else {
                    false
                };
                decide(&q, clean, ancestor_blob)
            } else {
                decide_one_tree(&q)
            };

            let action = self.guard_type_clash(&q, action, builder)?;
            tracing::trace!(path = %q.path.display(), ?action, "path decided");

            match action {
                Action::Keep => builder.keep(&q),
                Action::Update { oid, mode } => builder.update(&q.path, &oid, &mode),
                Action::Remove => builder.remove(&q.path),
                Action::Conflict => builder.conflict(&q),
            }
        }

        tracing::debug!(paths = visited, two_tree, "walk complete");
        Ok(())
    }

    /// An update may not materialize a file where the working tree holds a
    /// directory, or beneath an ancestor that is a file: the paths that
    /// would be destroyed become conflicts instead
    fn guard_type_clash(
        &self,
        q: &Quadruple,
        action: Action,
        builder: &mut SnapshotBuilder,
    ) -> Result<Action, ReconcileError> {
        let Action::Update { mode, .. } = &action else {
            return Ok(action);
        };
        if mode.is_tree() || matches!(mode, EntryMode::Gitlink) {
            return Ok(action);
        }

        match &q.working {
            Some(working) if working.mode.is_tree() => {
                for child in self.workspace.files_under(&q.path)? {
                    builder.conflict_path(child);
                }
                Ok(Action::Conflict)
            }
            None => {
                if self.workspace.blocking_ancestor(&q.path)?.is_some() {
                    Ok(Action::Conflict)
                } else {
                    Ok(action)
                }
            }
            _ => Ok(action),
        }
    }

    /// Every planned update must resolve before the first disk write
    fn verify_content(&self) -> Result<(), ReconcileError> {
        for (path, (oid, mode)) in self.report.updated() {
            if matches!(mode, EntryMode::Gitlink) {
                continue;
            }

            if !self.store.contains_blob(oid)? {
                return Err(ReconcileError::MissingContent {
                    oid: oid.clone(),
                    path: path.clone(),
                });
            }
        }

        Ok(())
    }

    fn remove_path(&self, path: &Path) -> Result<(), ReconcileError> {
        self.workspace
            .remove_entry(path)
            .map_err(|cause| ReconcileError::WriteFailure {
                path: path.to_path_buf(),
                cause,
            })
    }

    fn apply_update(
        &self,
        path: &Path,
        oid: &ObjectId,
        mode: &EntryMode,
    ) -> Result<EntryMetadata, ReconcileError> {
        let content = if matches!(mode, EntryMode::Gitlink) {
            Bytes::new()
        } else {
            self.store
                .blob(oid)?
                .ok_or_else(|| ReconcileError::MissingContent {
                    oid: oid.clone(),
                    path: path.to_path_buf(),
                })?
        };

        tracing::trace!(path = %path.display(), oid = %oid.to_short_oid(), "writing entry");

        self.workspace
            .write_entry(path, &content, mode, self.options.respect_file_mode)
            .map_err(|cause| ReconcileError::WriteFailure {
                path: path.to_path_buf(),
                cause,
            })
    }

    fn abort(&mut self) {
        if let Some(locked) = self.locked.take() {
            locked.unlock();
        }
    }
}

/// Whether some proper ancestor of `path` is tracked as a blob in the tree
/// behind `root`
fn has_parent_blob<S: ObjectStore>(
    store: &S,
    root: &ObjectId,
    path: &Path,
) -> anyhow::Result<bool> {
    let Some(parent) = path.parent() else {
        return Ok(false);
    };

    for ancestor in parent.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }

        if let Some(node) = find_at(store, root, ancestor)?
            && !node.is_tree()
        {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Resolve a path inside the tree behind `root`
fn find_at<S: ObjectStore>(
    store: &S,
    root: &ObjectId,
    path: &Path,
) -> anyhow::Result<Option<TreeNode>> {
    let mut tree = store
        .tree(root)?
        .ok_or_else(|| anyhow!("Missing tree object {}", root))?;

    let components: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    for (position, component) in components.iter().enumerate() {
        let Some(node) = tree.get(component) else {
            return Ok(None);
        };

        if position + 1 == components.len() {
            return Ok(Some(node.clone()));
        }

        if !node.is_tree() {
            // a blob where a directory is needed: the path cannot resolve
            return Ok(None);
        }

        tree = store
            .tree(&node.oid)?
            .ok_or_else(|| anyhow!("Missing tree object {}", node.oid))?;
    }

    Ok(None)
}
