//! Merged path walker
//!
//! Drives the entry sources in a single pass over the union of their
//! paths, in strictly increasing order, presenting a coherent per-path
//! quadruple. When one source reports a file and another a directory at
//! the same path, both appear in the quadruple; the decision engine's
//! file/directory branch owns that case. Directories are always entered;
//! their contents arrive as later paths.

use crate::areas::database::ObjectStore;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::reconcile::entry_source::{
    EntrySource, IndexSlot, SourceEntry, WorkingEntry,
};
use std::path::PathBuf;

/// Per-path view across the four sources
///
/// Built fresh for each visited path and consumed immediately by the
/// decision engine.
#[derive(Debug, Clone)]
pub struct Quadruple {
    pub path: PathBuf,
    pub head: Option<SourceEntry>,
    pub merge: Option<SourceEntry>,
    pub index: Option<IndexSlot>,
    pub working: Option<WorkingEntry>,
}

impl Quadruple {
    /// The index entry decisions compare against, if the index holds real
    /// entries here
    pub fn index_entry(&self) -> Option<&IndexEntry> {
        self.index.as_ref().and_then(IndexSlot::representative)
    }
}

/// Merges up to four entry sources into one ordered stream of quadruples
pub struct PathWalker<'r, S: ObjectStore> {
    head: Option<EntrySource<'r, S>>,
    merge: EntrySource<'r, S>,
    index: EntrySource<'r, S>,
    working: EntrySource<'r, S>,
}

impl<'r, S: ObjectStore> PathWalker<'r, S> {
    pub fn new(
        head: Option<EntrySource<'r, S>>,
        merge: EntrySource<'r, S>,
        index: EntrySource<'r, S>,
        working: EntrySource<'r, S>,
    ) -> Self {
        PathWalker {
            head,
            merge,
            index,
            working,
        }
    }

    /// The next path present in any source, with every source's entry at
    /// that path
    pub fn next(&mut self) -> anyhow::Result<Option<Quadruple>> {
        let Some(path) = self.min_path() else {
            return Ok(None);
        };

        let mut quadruple = Quadruple {
            path: path.clone(),
            head: None,
            merge: None,
            index: None,
            working: None,
        };

        if let Some(head) = self.head.as_mut()
            && head.current().is_some_and(|e| e.path == path)
        {
            quadruple.head = head.current().cloned();
            head.advance()?;
        }

        if self.merge.current().is_some_and(|e| e.path == path) {
            quadruple.merge = self.merge.current().cloned();
            self.merge.advance()?;
        }

        if self.index.current().is_some_and(|e| e.path == path) {
            quadruple.index = self.index.current_index_slot().cloned();
            self.index.advance()?;
        }

        if self.working.current().is_some_and(|e| e.path == path) {
            quadruple.working = self.working.current_working();
            self.working.advance()?;
        }

        Ok(Some(quadruple))
    }

    fn min_path(&self) -> Option<PathBuf> {
        let mut min: Option<&SourceEntry> = None;

        let currents = [
            self.head.as_ref().and_then(EntrySource::current),
            self.merge.current(),
            self.index.current(),
            self.working.current(),
        ];

        for entry in currents.into_iter().flatten() {
            min = match min {
                Some(best) if best.path <= entry.path => Some(best),
                _ => Some(entry),
            };
        }

        min.map(|entry| entry.path.clone())
    }
}
