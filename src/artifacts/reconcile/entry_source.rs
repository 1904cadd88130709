//! Entry sources
//!
//! Each of the four reconciliation inputs (head tree, merge tree, index,
//! working directory) is driven through the same cursor contract: yield
//! the entry at the current path, or absence, and advance in traversal
//! order (each directory before its contents, siblings by name). The
//! sources are tagged variants rather than trait objects; the walker
//! consumes them uniformly and reaches for variant-specific payloads where
//! it needs them.
//!
//! The index is flat, so its cursor synthesizes a directory entry ahead of
//! the first entry beneath each directory. That keeps the per-path kind
//! triple honest when another source holds a file at the same path.

use crate::areas::database::ObjectStore;
use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeNode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The entry one source reports at one path
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub mode: EntryMode,
    /// Content id; absent for working-tree entries and synthetic
    /// directories
    pub oid: Option<ObjectId>,
}

/// What the index holds at a path
#[derive(Debug, Clone)]
pub enum IndexSlot {
    /// Real entries, every stage present at this path, stage order
    Entries(Vec<IndexEntry>),
    /// A directory implied by entries beneath it; the id is unknown for a
    /// live index
    Directory { oid: Option<ObjectId> },
}

impl IndexSlot {
    /// The entry decisions compare against: the resolved entry if present,
    /// otherwise the lowest conflict stage
    pub fn representative(&self) -> Option<&IndexEntry> {
        match self {
            IndexSlot::Entries(entries) => entries.first(),
            IndexSlot::Directory { .. } => None,
        }
    }

    pub fn oid(&self) -> Option<&ObjectId> {
        match self {
            IndexSlot::Entries(entries) => entries.first().map(|e| &e.oid),
            IndexSlot::Directory { oid } => oid.as_ref(),
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, IndexSlot::Directory { .. })
    }

    pub fn entries(&self) -> &[IndexEntry] {
        match self {
            IndexSlot::Entries(entries) => entries,
            IndexSlot::Directory { .. } => &[],
        }
    }
}

/// A working-tree observation at a path
#[derive(Debug, Clone)]
pub struct WorkingEntry {
    pub mode: EntryMode,
    pub metadata: EntryMetadata,
}

/// A reconciliation input behind the uniform cursor contract
pub enum EntrySource<'r, S: ObjectStore> {
    Tree(TreeCursor<'r, S>),
    Index(IndexCursor),
    Working(WorktreeCursor),
}

impl<'r, S: ObjectStore> EntrySource<'r, S> {
    pub fn current(&self) -> Option<&SourceEntry> {
        match self {
            EntrySource::Tree(cursor) => cursor.current(),
            EntrySource::Index(cursor) => cursor.current(),
            EntrySource::Working(cursor) => cursor.current(),
        }
    }

    pub fn advance(&mut self) -> anyhow::Result<()> {
        match self {
            EntrySource::Tree(cursor) => cursor.advance(),
            EntrySource::Index(cursor) => {
                cursor.advance();
                Ok(())
            }
            EntrySource::Working(cursor) => {
                cursor.advance();
                Ok(())
            }
        }
    }

    /// The index payload at the current path (index variant only)
    pub fn current_index_slot(&self) -> Option<&IndexSlot> {
        match self {
            EntrySource::Index(cursor) => cursor.current_slot(),
            _ => None,
        }
    }

    /// The working-tree payload at the current path (working variant only)
    pub fn current_working(&self) -> Option<WorkingEntry> {
        match self {
            EntrySource::Working(cursor) => cursor.current_working(),
            _ => None,
        }
    }
}

/// Streaming descent through nested tree objects
///
/// Holds a stack of inflated tree levels; advancing past a directory entry
/// enters it, so children follow their directory immediately.
pub struct TreeCursor<'r, S: ObjectStore> {
    store: &'r S,
    stack: Vec<Level>,
    current: Option<SourceEntry>,
}

struct Level {
    prefix: PathBuf,
    entries: Vec<(String, TreeNode)>,
    pos: usize,
}

impl Level {
    fn from_tree(prefix: PathBuf, tree: &Tree) -> Self {
        Level {
            prefix,
            entries: tree
                .entries()
                .map(|(name, node)| (name.clone(), node.clone()))
                .collect(),
            pos: 0,
        }
    }
}

impl<'r, S: ObjectStore> TreeCursor<'r, S> {
    pub fn open(store: &'r S, root: &ObjectId) -> anyhow::Result<Self> {
        let tree = store
            .tree(root)?
            .ok_or_else(|| anyhow::anyhow!("Missing tree object {}", root))?;

        let mut cursor = TreeCursor {
            store,
            stack: vec![Level::from_tree(PathBuf::new(), &tree)],
            current: None,
        };
        cursor.settle();

        Ok(cursor)
    }

    pub fn current(&self) -> Option<&SourceEntry> {
        self.current.as_ref()
    }

    pub fn advance(&mut self) -> anyhow::Result<()> {
        let Some(top) = self.stack.last_mut() else {
            return Ok(());
        };

        let (name, node) = top.entries[top.pos].clone();
        let prefix = top.prefix.join(&name);
        top.pos += 1;

        if node.is_tree() {
            let subtree = self
                .store
                .tree(&node.oid)?
                .ok_or_else(|| anyhow::anyhow!("Missing tree object {}", node.oid))?;
            self.stack.push(Level::from_tree(prefix, &subtree));
        }

        self.settle();
        Ok(())
    }

    fn settle(&mut self) {
        while let Some(top) = self.stack.last() {
            if top.pos < top.entries.len() {
                break;
            }
            self.stack.pop();
        }

        self.current = self.stack.last().map(|top| {
            let (name, node) = &top.entries[top.pos];
            SourceEntry {
                path: top.prefix.join(name),
                mode: node.mode.clone(),
                oid: Some(node.oid.clone()),
            }
        });
    }
}

/// Cursor over the flat index, with synthetic directory entries
pub struct IndexCursor {
    items: Vec<IndexItem>,
    pos: usize,
}

struct IndexItem {
    entry: SourceEntry,
    slot: IndexSlot,
}

impl IndexCursor {
    pub fn new(index: &Index) -> Self {
        let mut items = Vec::new();
        let mut seen_dirs: HashSet<PathBuf> = HashSet::new();

        let mut entries = index.entries().peekable();
        while let Some(first) = entries.next() {
            let path = first.path.clone();

            let mut group = vec![first.clone()];
            while entries.peek().is_some_and(|next| next.path == path) {
                if let Some(next) = entries.next() {
                    group.push(next.clone());
                }
            }

            for ancestor in Self::parent_dirs(&path) {
                if seen_dirs.insert(ancestor.clone()) {
                    items.push(IndexItem {
                        entry: SourceEntry {
                            path: ancestor,
                            mode: EntryMode::Directory,
                            oid: None,
                        },
                        slot: IndexSlot::Directory { oid: None },
                    });
                }
            }

            let representative = &group[0];
            items.push(IndexItem {
                entry: SourceEntry {
                    path,
                    mode: representative.metadata.mode.clone(),
                    oid: Some(representative.oid.clone()),
                },
                slot: IndexSlot::Entries(group),
            });
        }

        IndexCursor { items, pos: 0 }
    }

    /// Proper ancestors of a path, outermost first
    fn parent_dirs(path: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = path
            .ancestors()
            .skip(1)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect();
        dirs.reverse();
        dirs
    }

    pub fn current(&self) -> Option<&SourceEntry> {
        self.items.get(self.pos).map(|item| &item.entry)
    }

    pub fn current_slot(&self) -> Option<&IndexSlot> {
        self.items.get(self.pos).map(|item| &item.slot)
    }

    pub fn advance(&mut self) {
        if self.pos < self.items.len() {
            self.pos += 1;
        }
    }
}

/// Cursor over the live working directory
pub struct WorktreeCursor {
    items: Vec<(SourceEntry, EntryMetadata)>,
    pos: usize,
}

impl WorktreeCursor {
    pub fn open(workspace: &Workspace) -> anyhow::Result<Self> {
        let items = workspace
            .list_entries()?
            .into_iter()
            .map(|(path, metadata)| {
                let entry = SourceEntry {
                    path,
                    mode: metadata.mode.clone(),
                    oid: None,
                };
                (entry, metadata)
            })
            .collect();

        Ok(WorktreeCursor { items, pos: 0 })
    }

    pub fn current(&self) -> Option<&SourceEntry> {
        self.items.get(self.pos).map(|(entry, _)| entry)
    }

    pub fn current_working(&self) -> Option<WorkingEntry> {
        self.items.get(self.pos).map(|(entry, metadata)| WorkingEntry {
            mode: entry.mode.clone(),
            metadata: metadata.clone(),
        })
    }

    pub fn advance(&mut self) {
        if self.pos < self.items.len() {
            self.pos += 1;
        }
    }
}
