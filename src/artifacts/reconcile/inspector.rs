//! Working-tree modification check
//!
//! Answers "is this path clean?" for the decision engine: the working
//! entry is compared against its index entry by mode and size first, then
//! timestamps, and only when those disagree is the content hashed. A
//! missing index entry counts as clean (nothing is staged to contradict),
//! a missing working entry does not.

use crate::areas::workspace::Workspace;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::reconcile::entry_source::WorkingEntry;
use crate::artifacts::reconcile::walker::Quadruple;
use derive_new::new;

#[derive(new)]
pub struct Inspector<'r> {
    workspace: &'r Workspace,
    respect_file_mode: bool,
}

impl Inspector<'_> {
    /// Whether the working entry at this path matches the staged entry
    pub fn is_clean(&self, q: &Quadruple) -> anyhow::Result<bool> {
        let Some(entry) = q.index_entry() else {
            return Ok(true);
        };
        let Some(working) = &q.working else {
            return Ok(false);
        };

        self.unmodified(entry, working)
    }

    fn unmodified(&self, entry: &IndexEntry, working: &WorkingEntry) -> anyhow::Result<bool> {
        if working.mode.is_tree() {
            return Ok(false);
        }

        if !self.modes_match(entry, working) {
            return Ok(false);
        }

        if entry.metadata.size != 0 && entry.metadata.size != working.metadata.size {
            return Ok(false);
        }

        if entry.times_match(&working.metadata) {
            return Ok(true);
        }

        // timestamps moved but size held: fall back to content
        let actual = self.workspace.hash_entry(&entry.path)?;
        Ok(actual == entry.oid)
    }

    fn modes_match(&self, entry: &IndexEntry, working: &WorkingEntry) -> bool {
        if entry.metadata.mode == working.mode {
            return true;
        }

        // with the executable bit out of play, any file mode matches any
        // other file mode
        !self.respect_file_mode && entry.metadata.mode.is_file() && working.mode.is_file()
    }
}
