//! Tree listings
//!
//! A tree is an ordered directory snapshot: entry name to (content id,
//! mode). Nested directories are separate tree objects referenced by id and
//! inflated through the [`ObjectStore`](crate::areas::database::ObjectStore)
//! boundary; this module only holds the in-memory listing the walker
//! descends through.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use derive_new::new;
use std::collections::BTreeMap;

/// A single tree entry: content id plus kind
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TreeNode {
    pub oid: ObjectId,
    pub mode: EntryMode,
}

impl TreeNode {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

/// Ordered directory listing
///
/// Entries are kept sorted by name so traversal yields paths in the same
/// order the index and the working tree are enumerated in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    entries: BTreeMap<String, TreeNode>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, node: TreeNode) {
        self.entries.insert(name.into(), node);
    }

    pub fn get(&self, name: &str) -> Option<&TreeNode> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &TreeNode)> {
        self.entries.iter()
    }
}
